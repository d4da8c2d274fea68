use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when no program status exists (provisioning failure,
/// timeout, rejected request).
pub const INFRASTRUCTURE_EXIT_CODE: i64 = -1;

pub const DEFAULT_MEMORY_MB: u64 = 512;
pub const DEFAULT_CPUS: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_PIDS_LIMIT: i64 = 256;
pub const DEFAULT_MAX_OUTPUT_KB: u64 = 1024;

/// Longest accepted wall clock timeout (one day)
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in MiB. Swap is pinned to the same value.
    #[serde(default)]
    pub memory_mb: Option<u64>,

    /// CPU ceiling in cores (fractional values allowed)
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Wall clock timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Maximum number of processes/threads
    #[serde(default)]
    pub pids_limit: Option<i64>,

    /// Maximum captured output in kilobytes
    #[serde(default)]
    pub max_output_kb: Option<u64>,
}

impl ResourceLimits {
    /// Create new resource limits with the reference defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, for use as an override set
    pub fn unset() -> Self {
        Self {
            memory_mb: None,
            cpus: None,
            timeout: None,
            pids_limit: None,
            max_output_kb: None,
        }
    }

    /// Set the memory ceiling in MiB
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    /// Set the CPU ceiling in cores
    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// Set the wall clock timeout in seconds
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Set the maximum number of processes
    pub fn with_pids_limit(mut self, pids: i64) -> Self {
        self.pids_limit = Some(pids);
        self
    }

    /// Set the maximum captured output in kilobytes
    pub fn with_max_output_kb(mut self, kb: u64) -> Self {
        self.max_output_kb = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            memory_mb: overrides.memory_mb.or(self.memory_mb),
            cpus: overrides.cpus.or(self.cpus),
            timeout: overrides.timeout.or(self.timeout),
            pids_limit: overrides.pids_limit.or(self.pids_limit),
            max_output_kb: overrides.max_output_kb.or(self.max_output_kb),
        }
    }

    /// Fill every unset field with the reference default
    pub fn with_reference_defaults(&self) -> ResourceLimits {
        ResourceLimits::default().with_overrides(self)
    }

    /// Memory ceiling in bytes, as the container runtime expects it
    ///
    /// Unset falls back to the reference ceiling; there is no unlimited mode.
    pub fn memory_bytes(&self) -> i64 {
        let mb = self.memory_mb.unwrap_or(DEFAULT_MEMORY_MB);
        i64::try_from(mb.saturating_mul(1024 * 1024)).unwrap_or(i64::MAX)
    }

    /// CPU ceiling in units of 10^-9 CPUs
    pub fn nano_cpus(&self) -> i64 {
        let cpus = self
            .cpus
            .filter(|c| c.is_finite() && *c > 0.0)
            .unwrap_or(DEFAULT_CPUS);
        (cpus * 1_000_000_000.0).round() as i64
    }

    /// Process limit, falling back to the reference value
    pub fn pids(&self) -> i64 {
        self.pids_limit.unwrap_or(DEFAULT_PIDS_LIMIT)
    }

    /// Wall clock deadline
    ///
    /// Unset or nonsensical values fall back to the reference 30 seconds;
    /// anything longer than [`MAX_TIMEOUT_SECS`] is clamped.
    pub fn deadline(&self) -> Duration {
        let secs = self
            .timeout
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(30))
    }

    /// Captured output cap in bytes
    pub fn max_output_bytes(&self) -> usize {
        let kb = self.max_output_kb.unwrap_or(DEFAULT_MAX_OUTPUT_KB);
        usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: Some(DEFAULT_MEMORY_MB),
            cpus: Some(DEFAULT_CPUS),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            pids_limit: Some(DEFAULT_PIDS_LIMIT),
            max_output_kb: Some(DEFAULT_MAX_OUTPUT_KB),
        }
    }
}

/// A single request to run a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language identifier or alias (case-insensitive)
    pub language: String,

    /// Literal program text
    pub code: String,

    /// Data piped to the program's standard input, closed after writing
    #[serde(default)]
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Why an execution did not produce successful output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The program ran and exited with a non-zero status
    Runtime,
    /// The request was malformed (e.g. empty code)
    InvalidRequest,
    /// No runtime profile matches the requested language
    UnsupportedLanguage,
    /// The container could not be created or started
    Provisioning,
    /// The wall clock deadline elapsed
    Timeout,
    /// The caller cancelled the execution
    Cancelled,
    /// The container could not be attached to, waited on, or read from
    Infrastructure,
}

impl FailureKind {
    /// Failures that never reached a program exit status
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, FailureKind::Runtime)
    }
}

/// Result of an execution
///
/// Exactly one of `output` and `error` is set. `output` may be an empty
/// string; `None` means no successful output exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Combined program output on a zero exit status
    pub output: Option<String>,

    /// Diagnostic text or failure description
    pub error: Option<String>,

    /// Exit status reported by the runtime, or [`INFRASTRUCTURE_EXIT_CODE`]
    pub exit_code: i64,

    /// Time from provisioning to the final status, in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// The program exited with status 0
    pub fn success(output: String, exit_code: i64) -> Self {
        Self {
            output: Some(output),
            error: None,
            exit_code,
            execution_time_ms: 0,
            failure: None,
        }
    }

    /// The program ran and exited with a non-zero status
    ///
    /// An empty diagnostic is replaced so that `error` is never blank.
    pub fn runtime_failure(diagnostic: String, exit_code: i64) -> Self {
        let error = if diagnostic.trim().is_empty() {
            format!("process exited with status {exit_code}")
        } else {
            diagnostic
        };
        Self {
            output: None,
            error: Some(error),
            exit_code,
            execution_time_ms: 0,
            failure: Some(FailureKind::Runtime),
        }
    }

    /// No exit status exists; `message` describes what went wrong
    pub fn infrastructure_failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(message.into()),
            exit_code: INFRASTRUCTURE_EXIT_CODE,
            execution_time_ms: 0,
            failure: Some(kind),
        }
    }

    /// Map an exit status and the captured combined log to a result
    pub fn from_exit(exit_code: i64, log: String) -> Self {
        if exit_code == 0 {
            Self::success(log, exit_code)
        } else {
            Self::runtime_failure(log, exit_code)
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.execution_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Check if the program exited with status 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.output.is_some()
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}
