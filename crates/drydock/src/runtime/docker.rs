//! Docker implementation of the container runtime
//!
//! Talks to the Docker Engine API through bollard. One client is shared by all
//! executions; it holds no per-call state.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use bollard::container::{AttachContainerResults, LogOutput};
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptions, CreateImageOptions,
    KillContainerOptions, ListContainersOptionsBuilder, LogsOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, WaitContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::stream::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::runtime::{
    CapturedOutput, ContainerRuntime, ContainerSpec, MANAGED_LABEL, OutputBuffer, RuntimeError,
};

/// Seconds before a Docker API request is abandoned
const CLIENT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect_local() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connect to the daemon listening on the given unix socket
    pub fn connect_socket(path: &Path) -> Result<Self, RuntimeError> {
        let path = path
            .to_str()
            .ok_or_else(|| RuntimeError::Connect(format!("invalid socket path: {}", path.display())))?;
        let docker = Docker::connect_with_socket(path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Connect to the configured socket, or local defaults
    pub fn connect(socket: Option<&Path>) -> Result<Self, RuntimeError> {
        match socket {
            Some(path) => Self::connect_socket(path),
            None => Self::connect_local(),
        }
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Connect(e.to_string()))
    }

    /// Pull an image so later executions do not fail provisioning
    #[instrument(skip(self))]
    pub async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = Some(CreateImageOptions {
            from_image: Some(image.to_owned()),
            ..Default::default()
        });

        let mut progress = self.docker.create_image(options, None, None);
        while let Some(event) = progress.next().await {
            match event {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image, status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::PullFailed {
                        image: image.to_owned(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(image, "image pulled");
        Ok(())
    }

    /// Remove every container carrying the managed label
    ///
    /// Returns how many were removed. Used to clean up after a process that
    /// died without reclaiming its environments.
    pub async fn prune(&self) -> Result<usize, RuntimeError> {
        let mut removed = 0;
        for id in self.list_managed().await? {
            match self.remove(&id).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(id, error = %e, "failed to prune container"),
            }
        }
        Ok(removed)
    }
}

fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(error: &BollardError) -> bool {
    status_code(error) == Some(404)
}

/// 409 on attach/kill: the container is not running
fn is_not_running(error: &BollardError) -> bool {
    status_code(error) == Some(409)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let options = Some(CreateContainerOptions {
            name: Some(spec.name().to_owned()),
            ..Default::default()
        });

        let response = self
            .docker
            .create_container(options, spec.to_create_body())
            .await
            .map_err(|e| RuntimeError::CreateFailed {
                image: spec.image().to_owned(),
                message: e.to_string(),
            })?;

        for warning in &response.warnings {
            warn!(id = %response.id, warning = %warning, "docker create warning");
        }
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| RuntimeError::StartFailed {
                id: id.to_owned(),
                message: e.to_string(),
            })
    }

    async fn write_stdin(&self, id: &str, input: &[u8]) -> Result<(), RuntimeError> {
        let options = AttachContainerOptionsBuilder::default()
            .stdin(true)
            .stream(true)
            .build();

        let AttachContainerResults {
            output,
            input: mut stdin,
        } = match self
            .docker
            .attach_container(id, Some(options))
            .await
        {
            Ok(results) => results,
            Err(e) if is_not_running(&e) => {
                debug!(id, "program exited before reading its input");
                return Ok(());
            }
            Err(e) => {
                return Err(RuntimeError::AttachFailed {
                    id: id.to_owned(),
                    message: e.to_string(),
                });
            }
        };

        let written = async {
            stdin.write_all(input).await?;
            stdin.flush().await?;
            // Half-close: with stdin_once the daemon closes the program's stdin
            stdin.shutdown().await
        }
        .await;
        drop(output);

        match written {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!(id, "program closed stdin before all input was written");
                Ok(())
            }
            Err(e) => Err(RuntimeError::AttachFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    async fn wait(&self, id: &str) -> Result<i64, RuntimeError> {
        let mut stream = self.docker.wait_container(id, None::<WaitContainerOptions>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) if is_not_found(&e) => Err(RuntimeError::NotFound(id.to_owned())),
            Some(Err(e)) => Err(RuntimeError::WaitFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
            None => Err(RuntimeError::WaitFailed {
                id: id.to_owned(),
                message: "wait stream ended unexpectedly".to_owned(),
            }),
        }
    }

    async fn logs(&self, id: &str, limit: Option<usize>) -> Result<CapturedOutput, RuntimeError> {
        let options = Some(LogsOptions {
            stdout: true,
            stderr: true,
            ..Default::default()
        });

        let mut stream = self.docker.logs(id, options);
        let mut buffer = OutputBuffer::new(limit);
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message },
                ) => buffer.push(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    return Err(RuntimeError::LogsFailed {
                        id: id.to_owned(),
                        message: e.to_string(),
                    });
                }
            }
            if buffer.is_full() {
                break;
            }
        }

        Ok(buffer.finish())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        // Default signal is SIGKILL; there is nothing worth a graceful stop
        match self
            .docker
            .kill_container(id, None::<KillContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_running(&e) => Ok(()),
            Err(e) if is_not_found(&e) => Err(RuntimeError::NotFound(id.to_owned())),
            Err(e) => Err(RuntimeError::StopFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::default()
            .force(true)
            .v(true)
            .build();

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Err(RuntimeError::NotFound(id.to_owned())),
            Err(e) => Err(RuntimeError::RemoveFailed {
                id: id.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    async fn list_managed(&self) -> Result<Vec<String>, RuntimeError> {
        let label = format!("{MANAGED_LABEL}=true");
        let mut filters = HashMap::new();
        filters.insert("label", vec![label.as_str()]);

        let options = ListContainersOptionsBuilder::default()
            .all(true)
            .filters(&filters)
            .build();

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_server_errors() {
        let not_found = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_owned(),
        };
        let conflict = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "is not running".to_owned(),
        };
        assert!(is_not_found(&not_found));
        assert!(!is_not_running(&not_found));
        assert!(is_not_running(&conflict));
        assert!(!is_not_found(&conflict));
    }
}
