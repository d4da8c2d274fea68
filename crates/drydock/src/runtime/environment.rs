//! Execution environment lifecycle
//!
//! Manages the creation, use, and reclamation of one container.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::runtime::{CapturedOutput, ContainerRuntime, ContainerSpec, RuntimeError};

/// A provisioned container bound to one execution
///
/// # Reclamation
///
/// Call [`reclaim()`](Self::reclaim) on every path once the environment is no
/// longer needed. It consumes the guard, so an environment is torn down at most
/// once. If the guard is dropped without reclamation (the owning future was
/// cancelled, or a panic unwound through it), `Drop` logs a warning and spawns
/// the same stop-and-remove sequence on the current Tokio runtime.
#[derive(Debug)]
pub struct Environment {
    id: String,
    runtime: Arc<dyn ContainerRuntime>,
    reclaimed: bool,
}

impl Environment {
    /// Create the container described by `spec`
    ///
    /// Nothing is running yet; call [`start()`](Self::start) next.
    #[instrument(skip(runtime, spec), fields(image = spec.image(), name = spec.name()))]
    pub async fn provision(
        runtime: Arc<dyn ContainerRuntime>,
        spec: &ContainerSpec,
    ) -> Result<Self, RuntimeError> {
        let id = runtime.create(spec).await?;
        debug!(%id, "environment provisioned");
        Ok(Self {
            id,
            runtime,
            reclaimed: false,
        })
    }

    /// Get the container id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start the container's process
    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.runtime.start(&self.id).await
    }

    /// Write input to stdin and close it
    pub async fn write_stdin(&self, input: &[u8]) -> Result<(), RuntimeError> {
        self.runtime.write_stdin(&self.id, input).await
    }

    /// Wait for the process to exit
    pub async fn wait(&self) -> Result<i64, RuntimeError> {
        self.runtime.wait(&self.id).await
    }

    /// Collect the combined log
    pub async fn logs(&self, limit: Option<usize>) -> Result<CapturedOutput, RuntimeError> {
        self.runtime.logs(&self.id, limit).await
    }

    /// Stop (if still running) and remove the container
    ///
    /// Failures are logged and swallowed: an environment that already vanished
    /// must not change the outcome of the execution that owned it.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn reclaim(mut self) {
        teardown(self.runtime.as_ref(), &self.id).await;
        // Only now: a reclaim interrupted mid-teardown falls back to `Drop`
        self.reclaimed = true;
    }
}

async fn teardown(runtime: &dyn ContainerRuntime, id: &str) {
    if let Err(e) = runtime.stop(id).await {
        if !e.is_not_found() {
            debug!(id, error = %e, "stop during reclamation failed");
        }
    }
    match runtime.remove(id).await {
        Ok(()) => debug!(id, "environment reclaimed"),
        Err(e) if e.is_not_found() => debug!(id, "environment already gone"),
        Err(e) => warn!(id, error = %e, "failed to remove environment"),
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.reclaimed {
            return;
        }

        warn!(
            id = %self.id,
            "Environment dropped without reclamation, spawning best-effort teardown"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = Arc::clone(&self.runtime);
                let id = std::mem::take(&mut self.id);
                handle.spawn(async move {
                    teardown(runtime.as_ref(), &id).await;
                });
            }
            Err(_) => {
                warn!(id = %self.id, "no Tokio runtime available, container leaked");
            }
        }
    }
}
