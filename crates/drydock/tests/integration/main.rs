//! Integration tests for drydock
//!
//! These tests need a reachable Docker daemon and pull small public images.
//! Run with: cargo test -p drydock --features integration-tests
//!
//! Tests that talk to Docker are marked `#[ignore]`. To include them:
//!   cargo test -p drydock --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drydock::runtime::CapturedOutput;
use drydock::{
    Config, ContainerRuntime, ContainerSpec, DockerRuntime, Orchestrator, ResourceLimits,
    RuntimeError, RuntimeProfile,
};

mod config_loading;
mod execution;
mod lifecycle;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

pub(crate) const SHELL_IMAGE: &str = "alpine:3.20";

/// Path of a fixture config file
pub(crate) fn fixture_config(name: &str) -> String {
    format!("{FIXTURES_PATH}/configs/{name}")
}

/// Embedded languages plus a small shell profile, with a short timeout
pub(crate) fn test_config(timeout: f64) -> Config {
    let shell = RuntimeProfile {
        aliases: vec!["sh".to_owned()],
        ..RuntimeProfile::new("POSIX shell", SHELL_IMAGE, ["sh", "-c", "{code}"])
    };
    let mut config = Config::default().with_language("shell", shell);
    config.default_limits = ResourceLimits::default().with_timeout(timeout);
    config
}

/// Docker runtime that remembers which containers it created
#[derive(Debug)]
pub(crate) struct RecordingRuntime {
    inner: DockerRuntime,
    created: Mutex<Vec<String>>,
}

impl RecordingRuntime {
    pub(crate) fn connect() -> Arc<Self> {
        let inner = DockerRuntime::connect_local().expect("Failed to connect to docker");
        Arc::new(Self {
            inner,
            created: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// Created containers that still exist
    pub(crate) async fn leaked(&self) -> Vec<String> {
        let live = self.inner.list_managed().await.expect("Failed to list containers");
        self.created()
            .into_iter()
            .filter(|id| live.contains(id))
            .collect()
    }

    pub(crate) async fn pull(&self, image: &str) {
        self.inner
            .pull_image(image)
            .await
            .unwrap_or_else(|e| panic!("Failed to pull {image}: {e}"));
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let id = self.inner.create(spec).await?;
        self.created.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.inner.start(id).await
    }

    async fn write_stdin(&self, id: &str, input: &[u8]) -> Result<(), RuntimeError> {
        self.inner.write_stdin(id, input).await
    }

    async fn wait(&self, id: &str) -> Result<i64, RuntimeError> {
        self.inner.wait(id).await
    }

    async fn logs(&self, id: &str, limit: Option<usize>) -> Result<CapturedOutput, RuntimeError> {
        self.inner.logs(id, limit).await
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.inner.stop(id).await
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.inner.remove(id).await
    }

    async fn list_managed(&self) -> Result<Vec<String>, RuntimeError> {
        self.inner.list_managed().await
    }
}

/// Orchestrator over a recording Docker runtime, with `images` pulled
pub(crate) async fn orchestrator(
    timeout: f64,
    images: &[&str],
) -> (Orchestrator, Arc<RecordingRuntime>) {
    let runtime = RecordingRuntime::connect();
    for image in images {
        runtime.pull(image).await;
    }
    (Orchestrator::new(test_config(timeout), runtime.clone()), runtime)
}
