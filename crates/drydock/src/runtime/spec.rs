//! Container specification builder
//!
//! Builds the create request for one execution environment: image, argv,
//! resource ceilings and the isolation settings every environment gets.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig};
use uuid::Uuid;

use crate::config::RuntimeProfile;
use crate::runtime::MANAGED_LABEL;
use crate::types::ResourceLimits;

/// Builder for a container create request
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Container name (`drydock-<uuid>`)
    name: String,
    image: String,
    command: Vec<String>,
    /// `KEY=VALUE` pairs
    env: Vec<String>,
    labels: HashMap<String, String>,
    limits: ResourceLimits,
    /// Open stdin for a single attach
    open_stdin: bool,
}

impl ContainerSpec {
    /// Create a new spec for the given image with a unique name
    pub fn new(image: impl Into<String>) -> Self {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_owned(), "true".to_owned());
        Self {
            name: format!("drydock-{}", Uuid::new_v4()),
            image: image.into(),
            command: Vec::new(),
            env: Vec::new(),
            labels,
            limits: ResourceLimits::default(),
            open_stdin: false,
        }
    }

    /// Spec for running `code` under `profile`
    pub fn for_profile(profile: &RuntimeProfile, code: &str, limits: ResourceLimits) -> Self {
        Self::new(&profile.image)
            .command(profile.expand_command(code))
            .envs(profile.env.iter().cloned())
            .limits(limits)
    }

    /// Set the command to run
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable in `KEY=VALUE` form
    pub fn env(mut self, var: impl Into<String>) -> Self {
        self.env.push(var.into());
        self
    }

    /// Add multiple environment variables
    pub fn envs(mut self, vars: impl IntoIterator<Item = String>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Add a container label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Keep stdin open until the first attached writer closes it
    pub fn open_stdin(mut self, enable: bool) -> Self {
        self.open_stdin = enable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn argv(&self) -> &[String] {
        &self.command
    }

    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn stdin_open(&self) -> bool {
        self.open_stdin
    }

    /// Build the Docker create body
    ///
    /// Networking is disabled, swap is pinned to the memory ceiling, every
    /// capability is dropped and privilege escalation is blocked.
    pub fn to_create_body(&self) -> ContainerCreateBody {
        let memory = Some(self.limits.memory_bytes());

        let host_config = HostConfig {
            memory,
            memory_swap: memory,
            nano_cpus: Some(self.limits.nano_cpus()),
            pids_limit: Some(self.limits.pids()),
            network_mode: Some("none".to_owned()),
            cap_drop: Some(vec!["ALL".to_owned()]),
            security_opt: Some(vec!["no-new-privileges".to_owned()]),
            ..Default::default()
        };

        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(self.command.clone()),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            labels: Some(self.labels.clone()),
            network_disabled: Some(true),
            tty: Some(false),
            attach_stdin: Some(self.open_stdin),
            open_stdin: Some(self.open_stdin),
            stdin_once: Some(self.open_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}
