use std::time::{Duration, Instant};

use drydock::{
    ContainerRuntime, ContainerSpec, DockerRuntime, ExecutionRequest, FailureKind,
    INFRASTRUCTURE_EXIT_CODE,
};

use super::{SHELL_IMAGE, orchestrator};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_timeout_kills_and_reclaims() {
    let (orchestrator, runtime) = orchestrator(2.0, &[SHELL_IMAGE]).await;

    let started = Instant::now();
    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "sleep 60"))
        .await;
    let elapsed = started.elapsed();

    assert!(result.is_timeout());
    assert_eq!(result.output, None);
    assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(20), "took {elapsed:?}");
    assert_eq!(runtime.created().len(), 1);
    assert!(runtime.leaked().await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_executions_leave_nothing_behind() {
    let (orchestrator, runtime) = orchestrator(3.0, &[SHELL_IMAGE]).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let orchestrator = orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            let code = match i % 3 {
                0 => format!("echo {i}"),
                1 => format!("exit {i}"),
                _ => "sleep 60".to_owned(),
            };
            (i, orchestrator.execute(&ExecutionRequest::new("shell", code)).await)
        }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        match i % 3 {
            0 => assert_eq!(result.output, Some(format!("{i}\n"))),
            1 => assert_eq!(result.exit_code, i),
            _ => assert!(result.is_timeout()),
        }
    }

    assert_eq!(runtime.created().len(), 8);
    assert!(runtime.leaked().await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_no_network() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new(
            "shell",
            "wget -q -T 3 -O - http://example.com && echo reachable || echo isolated",
        ))
        .await;

    assert_eq!(result.output.as_deref(), Some("isolated\n"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_memory_ceiling_applies() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new(
            "shell",
            "cat /sys/fs/cgroup/memory.max 2>/dev/null || cat /sys/fs/cgroup/memory/memory.limit_in_bytes",
        ))
        .await;

    let limit: u64 = result.output.unwrap().trim().parse().unwrap();
    assert_eq!(limit, 512 * 1024 * 1024);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cancelled_future_is_reclaimed() {
    let (orchestrator, runtime) = orchestrator(60.0, &[SHELL_IMAGE]).await;

    let task = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .execute(&ExecutionRequest::new("shell", "sleep 60"))
                .await
        }
    });
    tokio::time::sleep(Duration::from_secs(2)).await;
    task.abort();
    let _ = task.await;

    let deadline = Instant::now() + Duration::from_secs(15);
    while !runtime.leaked().await.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(runtime.created().len(), 1);
    assert!(runtime.leaked().await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_managed_label_is_listed() {
    let docker = DockerRuntime::connect_local().unwrap();
    docker.pull_image(SHELL_IMAGE).await.unwrap();

    let spec = ContainerSpec::new(SHELL_IMAGE).command(["sleep", "60"]);
    let id = docker.create(&spec).await.unwrap();
    assert!(docker.list_managed().await.unwrap().contains(&id));

    docker.remove(&id).await.unwrap();
    assert!(!docker.list_managed().await.unwrap().contains(&id));
    assert!(docker.remove(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_failure_kind_for_runtime_error_is_runtime() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "exit 1"))
        .await;

    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert_eq!(result.error.as_deref(), Some("process exited with status 1"));
}
