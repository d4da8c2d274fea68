//! One execution, start to finish
//!
//! Provision, start, race the run against the deadline and the cancellation
//! token, collect the log, reclaim.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::RuntimeProfile;
use crate::orchestrator::ExecuteError;
use crate::runtime::{CapturedOutput, ContainerRuntime, ContainerSpec, Environment};
use crate::types::{ExecutionRequest, ResourceLimits};

/// A program that ran to its natural exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Exit status reported by the runtime
    pub exit_code: i64,

    /// Combined stdout/stderr
    pub output: CapturedOutput,
}

impl Completion {
    /// Turn a non-zero exit status into [`ExecuteError::Execution`]
    pub fn check(self) -> Result<Self, ExecuteError> {
        if self.exit_code == 0 {
            Ok(self)
        } else {
            Err(ExecuteError::Execution {
                exit_code: self.exit_code,
                diagnostic: self.output.text,
            })
        }
    }
}

/// Execute `request` in a fresh environment
///
/// The environment is reclaimed on every path out of this function. If the
/// returned future is dropped early, the [`Environment`] guard takes over.
#[instrument(skip_all, fields(language = %request.language, image = %profile.image))]
pub(crate) async fn execute(
    runtime: Arc<dyn ContainerRuntime>,
    profile: &RuntimeProfile,
    limits: ResourceLimits,
    request: &ExecutionRequest,
    cancel: &CancellationToken,
) -> Result<Completion, ExecuteError> {
    let spec = ContainerSpec::for_profile(profile, &request.code, limits.clone())
        .open_stdin(request.input.is_some());

    let env = Environment::provision(runtime, &spec)
        .await
        .map_err(ExecuteError::Provisioning)?;

    let outcome = drive(&env, request.input.as_deref(), &limits, cancel).await;
    env.reclaim().await;

    outcome
}

async fn drive(
    env: &Environment,
    input: Option<&str>,
    limits: &ResourceLimits,
    cancel: &CancellationToken,
) -> Result<Completion, ExecuteError> {
    env.start().await.map_err(ExecuteError::Provisioning)?;
    debug!(id = env.id(), "environment started");

    let deadline = limits.deadline();
    let run = async {
        if let Some(input) = input {
            env.write_stdin(input.as_bytes()).await?;
            debug!(id = env.id(), len = input.len(), "input written, stdin closed");
        }
        env.wait().await
    };

    let exit_code = tokio::select! {
        status = run => status.map_err(ExecuteError::Infrastructure)?,
        _ = tokio::time::sleep(deadline) => {
            warn!(id = env.id(), ?deadline, "execution timed out");
            return Err(ExecuteError::Timeout(deadline));
        }
        _ = cancel.cancelled() => {
            debug!(id = env.id(), "execution cancelled");
            return Err(ExecuteError::Cancelled);
        }
    };

    let output = env
        .logs(Some(limits.max_output_bytes()))
        .await
        .map_err(ExecuteError::Infrastructure)?;

    debug!(
        id = env.id(),
        exit_code,
        bytes = output.text.len(),
        truncated = output.truncated,
        "execution complete"
    );

    Ok(Completion { exit_code, output })
}
