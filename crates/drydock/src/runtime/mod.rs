//! Container runtime wrapper
//!
//! This module provides the seam between the orchestrator and the isolation
//! runtime: a container specification builder, the [`ContainerRuntime`] trait,
//! its Docker implementation, and the scoped [`Environment`] guard that makes
//! sure every created container is reclaimed.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::runtime::docker::DockerRuntime;
pub use crate::runtime::environment::Environment;
pub use crate::runtime::output::{CapturedOutput, OutputBuffer, TRUNCATION_MARKER};
pub use crate::runtime::spec::ContainerSpec;

mod docker;
mod environment;
mod output;
mod spec;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Label put on every container the orchestrator creates
pub const MANAGED_LABEL: &str = "drydock.managed";

/// Errors that occur while talking to the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("failed to create container from image '{image}': {message}")]
    CreateFailed { image: String, message: String },

    #[error("failed to start container {id}: {message}")]
    StartFailed { id: String, message: String },

    #[error("failed to attach to container {id}: {message}")]
    AttachFailed { id: String, message: String },

    #[error("failed waiting for container {id}: {message}")]
    WaitFailed { id: String, message: String },

    #[error("failed to read logs of container {id}: {message}")]
    LogsFailed { id: String, message: String },

    #[error("failed to stop container {id}: {message}")]
    StopFailed { id: String, message: String },

    #[error("failed to remove container {id}: {message}")]
    RemoveFailed { id: String, message: String },

    #[error("container {0} not found")]
    NotFound(String),

    #[error("failed to pull image '{image}': {message}")]
    PullFailed { image: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// The container no longer exists (removed elsewhere or never created)
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Operations the orchestrator needs from an isolation runtime
///
/// Implementations hold no per-call state and are shared across concurrent
/// executions behind an `Arc`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + fmt::Debug {
    /// Create a container (not started) and return its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Start a created container
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Write `input` to the container's stdin and close the stream
    async fn write_stdin(&self, id: &str, input: &[u8]) -> Result<(), RuntimeError>;

    /// Wait for the container's process to exit and return its status
    async fn wait(&self, id: &str) -> Result<i64, RuntimeError>;

    /// Collect the combined stdout/stderr log in the order it was written
    async fn logs(&self, id: &str, limit: Option<usize>) -> Result<CapturedOutput, RuntimeError>;

    /// Forcibly stop a running container
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    /// Remove a container and its filesystem
    async fn remove(&self, id: &str) -> Result<(), RuntimeError>;

    /// Ids of every container carrying [`MANAGED_LABEL`], running or not
    async fn list_managed(&self) -> Result<Vec<String>, RuntimeError>;
}
