//! Configuration file loading for Drydock
//!
//! Handles loading and parsing configuration files using the config crate.
//! Sources are layered: embedded defaults, then an optional file, then
//! `DRYDOCK_*` environment variables.

use std::collections::HashSet;
use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{CODE_PLACEHOLDER, Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG};
use crate::types::{MAX_TIMEOUT_SECS, ResourceLimits};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.finish()
    }

    /// Load the layered configuration: embedded defaults, the optional file
    /// at `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, env_source())
    }

    pub(crate) fn load_with_env(
        path: Option<&Path>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            let content = read_file(path)?;
            builder = builder.add_source(File::from_str(&content, FileFormat::Toml));
        }

        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.finish()
    }

    /// Validate, then normalize: language ids are lowercased and unset default
    /// limits take the reference values
    fn finish(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        self.languages = self
            .languages
            .into_iter()
            .map(|(id, profile)| (id.to_lowercase(), profile))
            .collect();
        self.default_limits = self.default_limits.with_reference_defaults();
        Ok(self)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        validate_limits("default_limits", &self.default_limits)?;

        let mut seen: HashSet<String> = self.languages.keys().map(|id| id.to_lowercase()).collect();
        if seen.len() != self.languages.len() {
            return Err(ConfigError::Invalid(
                "language ids must be unique ignoring case".to_owned(),
            ));
        }

        for (id, profile) in &self.languages {
            if profile.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if profile.image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if profile.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty command"
                )));
            }
            if !profile.command.iter().any(|arg| arg.contains(CODE_PLACEHOLDER)) {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' command has no {CODE_PLACEHOLDER} placeholder"
                )));
            }
            for alias in &profile.aliases {
                if !seen.insert(alias.to_lowercase()) {
                    return Err(ConfigError::Invalid(format!(
                        "alias '{alias}' of language '{id}' is already taken"
                    )));
                }
            }
            if let Some(ref limits) = profile.limits {
                validate_limits(id, limits)?;
            }
        }

        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Check that every set limit is positive and the timeout is bounded
pub fn validate_limits(scope: &str, limits: &ResourceLimits) -> Result<(), ConfigError> {
    if limits.memory_mb == Some(0) {
        return Err(ConfigError::Invalid(format!("{scope}: memory_mb must be positive")));
    }
    if let Some(cpus) = limits.cpus {
        if !(cpus.is_finite() && cpus > 0.0) {
            return Err(ConfigError::Invalid(format!("{scope}: cpus must be positive")));
        }
    }
    if let Some(timeout) = limits.timeout {
        if !(timeout.is_finite() && timeout > 0.0) {
            return Err(ConfigError::Invalid(format!("{scope}: timeout must be positive")));
        }
        if timeout > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "{scope}: timeout must not exceed {MAX_TIMEOUT_SECS} seconds"
            )));
        }
    }
    if matches!(limits.pids_limit, Some(pids) if pids <= 0) {
        return Err(ConfigError::Invalid(format!("{scope}: pids_limit must be positive")));
    }
    Ok(())
}
