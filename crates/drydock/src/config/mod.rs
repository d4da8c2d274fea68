use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::loader::validate_limits;
pub use crate::config::profile::{CODE_PLACEHOLDER, RuntimeProfile, expand_command};
use crate::types::ResourceLimits;

mod loader;
pub mod profile;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../drydock.example.toml");

/// Prefix for environment variable overrides (`DRYDOCK_DEFAULT_LIMITS__TIMEOUT`)
pub const ENV_PREFIX: &str = "DRYDOCK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unsupported language: {0}")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Drydock
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the Docker socket (local defaults if not specified).
    #[serde(default)]
    pub docker_socket: Option<PathBuf>,

    /// Default resource limits applied to all executions.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Runtime profiles keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, RuntimeProfile>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_socket: None,
            default_limits: ResourceLimits::default(),
            languages: HashMap::new(),
        }
    }

    /// Add or replace a runtime profile
    pub fn with_language(mut self, id: impl Into<String>, profile: RuntimeProfile) -> Self {
        self.languages.insert(id.into().to_lowercase(), profile);
        self
    }

    /// Resolve a language ID or alias, ignoring case
    pub fn get_language(&self, id: &str) -> Result<&RuntimeProfile, ConfigError> {
        let key = id.trim().to_lowercase();
        self.languages
            .get(&key)
            .or_else(|| {
                self.languages
                    .values()
                    .find(|profile| profile.answers_to(&key))
            })
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Language IDs in sorted order
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Merge a profile's limits with the defaults
    pub fn effective_limits(&self, profile: &RuntimeProfile) -> ResourceLimits {
        match profile.limits {
            Some(ref limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
