//! A library for remote code execution in disposable containers.
//!
//! Drydock provides an async Rust API for running untrusted programs inside
//! short-lived Docker containers. Each execution gets a fresh environment with
//! no network, bounded memory and CPU, and a wall clock deadline; the
//! environment is reclaimed on every outcome.
//!
//! # Features
//!
//! - **Disposable environments**: one container per execution, always removed.
//! - **Multi-language**: TOML runtime profiles map languages to images and commands.
//! - **Deadline race**: runs that exceed their timeout are killed, not awaited.
//! - **Uniform results**: every outcome folds into an [`ExecutionResult`].
//!
//! # Example
//!
//! ```no_run
//! use drydock::{Config, ExecutionRequest, Orchestrator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::docker(Config::load(None)?)?;
//! let result = orchestrator
//!     .execute(&ExecutionRequest::new("python", "print(input())").with_input("hi"))
//!     .await;
//! assert_eq!(result.output.as_deref(), Some("hi\n"));
//! # Ok(())
//! # }
//! ```

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, RuntimeProfile};
pub use orchestrator::{Completion, ExecuteError, Orchestrator};
pub use runtime::{
    CapturedOutput, ContainerRuntime, ContainerSpec, DockerRuntime, Environment, RuntimeError,
};
pub use types::{
    ExecutionRequest, ExecutionResult, FailureKind, INFRASTRUCTURE_EXIT_CODE, ResourceLimits,
};

pub mod config;
pub mod orchestrator;
pub mod runtime;
pub mod types;
