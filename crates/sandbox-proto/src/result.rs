//! Outcome of one sandboxed execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Which failure class an unsuccessful execution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Static validation rejected the code; nothing was created.
    Validation,
    /// The sandbox is switched off in configuration.
    Disabled,
    /// The isolated environment could not be created.
    Creation,
    /// The program ran and exited non-zero, or produced a malformed payload.
    Runtime,
    /// The wall-clock bound elapsed.
    Timeout,
    /// The runtime security monitor terminated the environment.
    SecurityPolicy,
    /// The sandbox infrastructure itself misbehaved.
    Unexpected,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Disabled => "disabled",
            Self::Creation => "creation",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
            Self::SecurityPolicy => "security_policy",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result returned by every execution, successful or not.
///
/// Constructed only through [`ExecutionResult::success`] and
/// [`ExecutionResult::failure`] so a failed result never carries a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub structured_output: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<ExecutionErrorKind>,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
    pub container_id: Option<String>,
    pub exit_code: Option<i64>,
    pub validated: bool,
    pub cleanup_succeeded: bool,
    pub raw_logs: Option<String>,
}

impl ExecutionResult {
    /// A program that exited zero, with whatever payload its output carried.
    pub fn success(structured_output: Option<Value>, raw_logs: String) -> Self {
        Self {
            success: true,
            structured_output,
            error: None,
            error_kind: None,
            execution_time: Duration::ZERO,
            container_id: None,
            exit_code: Some(0),
            validated: false,
            cleanup_succeeded: true,
            raw_logs: Some(raw_logs),
        }
    }

    /// Any failed execution.
    pub fn failure(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            structured_output: None,
            error: Some(message.into()),
            error_kind: Some(kind),
            execution_time: Duration::ZERO,
            container_id: None,
            exit_code: None,
            validated: false,
            cleanup_succeeded: true,
            raw_logs: None,
        }
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.raw_logs = Some(logs.into());
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_validated(mut self, validated: bool) -> Self {
        self.validated = validated;
        self
    }

    /// Attach the environment id and the outcome of its teardown.
    pub fn with_container(mut self, id: Option<String>, cleanup_succeeded: bool) -> Self {
        // Nothing to clean when no environment exists.
        self.cleanup_succeeded = id.is_none() || cleanup_succeeded;
        self.container_id = id;
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    pub fn is_kind(&self, kind: ExecutionErrorKind) -> bool {
        self.error_kind == Some(kind)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("execution time must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
