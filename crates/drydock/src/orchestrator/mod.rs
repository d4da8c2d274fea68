//! Execution orchestrator for Drydock
//!
//! Provides the high-level API: resolve a language, run the program in a fresh
//! environment under a deadline, and fold every outcome into an
//! [`ExecutionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, RuntimeProfile};
use crate::runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
use crate::types::{ExecutionRequest, ExecutionResult, FailureKind};

pub use crate::orchestrator::execute::Completion;

mod execute;

/// Errors that end an execution without successful output
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to provision environment: {0}")]
    Provisioning(#[source] RuntimeError),

    #[error("process exited with status {exit_code}")]
    Execution { exit_code: i64, diagnostic: String },

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution failed: {0}")]
    Infrastructure(#[source] RuntimeError),
}

impl ExecuteError {
    /// Classify the error for callers
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecuteError::InvalidRequest(_) => FailureKind::InvalidRequest,
            ExecuteError::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            ExecuteError::Provisioning(_) => FailureKind::Provisioning,
            ExecuteError::Execution { .. } => FailureKind::Runtime,
            ExecuteError::Timeout(_) => FailureKind::Timeout,
            ExecuteError::Cancelled => FailureKind::Cancelled,
            ExecuteError::Infrastructure(_) => FailureKind::Infrastructure,
        }
    }

    /// Rejected before any environment was provisioned
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExecuteError::InvalidRequest(_) | ExecuteError::UnsupportedLanguage(_)
        )
    }
}

impl From<ExecuteError> for ExecutionResult {
    fn from(error: ExecuteError) -> Self {
        match error {
            ExecuteError::Execution {
                exit_code,
                diagnostic,
            } => ExecutionResult::runtime_failure(diagnostic, exit_code),
            other => ExecutionResult::infrastructure_failure(other.kind(), other.to_string()),
        }
    }
}

/// High-level entry point for running untrusted code
///
/// Cheap to clone; clones share the read-only configuration and the runtime
/// client. Calls are independent and may run concurrently.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Orchestrator {
    /// Create a new orchestrator over the given runtime
    pub fn new(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
        }
    }

    /// Create an orchestrator backed by Docker, using the configured socket
    ///
    /// The client connects lazily; no request is made until the first
    /// execution.
    pub fn docker(config: Config) -> Result<Self, RuntimeError> {
        let runtime = DockerRuntime::connect(config.docker_socket.as_deref())?;
        Ok(Self::new(config, Arc::new(runtime)))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared runtime client
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Configured language IDs in sorted order
    pub fn languages(&self) -> Vec<&str> {
        self.config.language_ids()
    }

    /// Check a request without provisioning anything
    pub fn validate(&self, request: &ExecutionRequest) -> Result<&RuntimeProfile, ExecuteError> {
        if request.language.trim().is_empty() {
            return Err(ExecuteError::InvalidRequest("language is required".to_owned()));
        }
        if request.code.is_empty() {
            return Err(ExecuteError::InvalidRequest("code is required".to_owned()));
        }
        self.config
            .get_language(&request.language)
            .map_err(|_| ExecuteError::UnsupportedLanguage(request.language.clone()))
    }

    /// Run a program and return its result
    ///
    /// Never fails: every outcome, including rejection, provisioning failure
    /// and timeout, is reported through the returned [`ExecutionResult`].
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`execute()`](Self::execute), but also stops when `cancel` fires
    ///
    /// Cancellation races alongside the deadline; the environment is reclaimed
    /// either way.
    pub async fn execute_with_cancel(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let result = match self.try_execute(request, cancel).await {
            Ok(completion) => ExecutionResult::success(completion.output.text, completion.exit_code),
            Err(error) => ExecutionResult::from(error),
        };
        let result = result.with_elapsed(started.elapsed());

        info!(
            language = %request.language,
            exit_code = result.exit_code,
            failure = ?result.failure,
            elapsed_ms = result.execution_time_ms,
            "execution finished"
        );
        result
    }

    /// Run a program, reporting anything but a zero exit status as an error
    pub async fn try_execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion, ExecuteError> {
        let profile = self.validate(request)?;
        let limits = self.config.effective_limits(profile);
        execute::execute(Arc::clone(&self.runtime), profile, limits, request, cancel)
            .await?
            .check()
    }
}
