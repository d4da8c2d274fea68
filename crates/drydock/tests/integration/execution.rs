use drydock::{
    ExecutionRequest, FailureKind, INFRASTRUCTURE_EXIT_CODE, Orchestrator, RuntimeProfile,
};

use super::{SHELL_IMAGE, orchestrator};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_shell_hello() {
    let (orchestrator, runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "echo hello"))
        .await;

    assert_eq!(result.output.as_deref(), Some("hello\n"));
    assert_eq!(result.error, None);
    assert_eq!(result.exit_code, 0);
    assert!(runtime.leaked().await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_hello() {
    let (orchestrator, _runtime) = orchestrator(60.0, &["python:3.11-slim"]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("python", "print('hello')"))
        .await;

    assert_eq!(result.output.as_deref(), Some("hello\n"));
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_input_passthrough() {
    let (orchestrator, _runtime) = orchestrator(60.0, &["python:3.11-slim"]).await;

    let request = ExecutionRequest::new("py", "print(input())").with_input("hello");
    let result = orchestrator.execute(&request).await;

    assert_eq!(result.output.as_deref(), Some("hello\n"));
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_input_closed_without_data() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "cat; echo done"))
        .await;

    assert_eq!(result.output.as_deref(), Some("done\n"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_empty_output_is_empty_string() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "true"))
        .await;

    assert_eq!(result.output.as_deref(), Some(""));
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_nonzero_exit() {
    let (orchestrator, runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("shell", "echo boom >&2; exit 3"))
        .await;

    assert_eq!(result.output, None);
    assert_eq!(result.error.as_deref(), Some("boom\n"));
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.failure, Some(FailureKind::Runtime));
    assert!(runtime.leaked().await.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_stdout_and_stderr_are_merged() {
    let (orchestrator, _runtime) = orchestrator(30.0, &[SHELL_IMAGE]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new(
            "shell",
            "echo one; sleep 0.2; echo two >&2; sleep 0.2; echo three",
        ))
        .await;

    assert_eq!(result.output.as_deref(), Some("one\ntwo\nthree\n"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_unsupported_language_creates_nothing() {
    let (orchestrator, runtime) = orchestrator(30.0, &[]).await;

    let result = orchestrator
        .execute(&ExecutionRequest::new("cobol", "DISPLAY 'HI'."))
        .await;

    assert_eq!(result.output, None);
    assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
    assert_eq!(result.failure, Some(FailureKind::UnsupportedLanguage));
    assert!(runtime.created().is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_missing_image_is_provisioning_failure() {
    let (orchestrator, runtime) = orchestrator(30.0, &[]).await;
    let config = orchestrator.config().clone().with_language(
        "ghost",
        RuntimeProfile::new(
            "Ghost",
            "drydock-test/does-not-exist:never",
            ["sh", "-c", "{code}"],
        ),
    );
    let orchestrator = Orchestrator::new(config, runtime.clone());

    let result = orchestrator
        .execute(&ExecutionRequest::new("ghost", "true"))
        .await;

    assert_eq!(result.failure, Some(FailureKind::Provisioning));
    assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
    assert!(runtime.created().is_empty());
}
