use serde::{Deserialize, Serialize};

use crate::types::ResourceLimits;

/// Placeholder in a run command that is replaced by the program text
pub const CODE_PLACEHOLDER: &str = "{code}";

/// How to run programs written in one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeProfile {
    /// Human-readable name (e.g., "Python 3.11")
    pub name: String,

    /// Base image reference (e.g., "python:3.11-slim")
    pub image: String,

    /// Entrypoint argv with a `{code}` placeholder
    pub command: Vec<String>,

    /// Extra identifiers that resolve to this profile
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Environment variables in `KEY=VALUE` form
    #[serde(default)]
    pub env: Vec<String>,

    /// Resource limits for this language (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl RuntimeProfile {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        command: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: command.into_iter().map(Into::into).collect(),
            aliases: Vec::new(),
            env: Vec::new(),
            limits: None,
        }
    }

    /// Expand the command template with the given program text
    ///
    /// The code is substituted as a whole argument value; it is never split or
    /// shell-quoted by the orchestrator.
    pub fn expand_command(&self, code: &str) -> Vec<String> {
        expand_command(&self.command, code)
    }

    /// Whether `id` (already lowercased) is one of this profile's aliases
    pub fn answers_to(&self, id: &str) -> bool {
        self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(id))
    }
}

/// Replace every `{code}` placeholder in the template
pub fn expand_command(command: &[String], code: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replace(CODE_PLACEHOLDER, code))
        .collect()
}
