//! Error types for container runtime operations.

use thiserror::Error;

/// Errors reported by a [`crate::ContainerRuntime`]
#[derive(Error, Debug)]
pub enum Error {
    #[error("No such container: {0}")]
    NotFound(String),

    #[error("Image '{0}' is not available locally; pull it before running sandboxed code")]
    ImageNotFound(String),

    #[error("Container runtime unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("Container {0} is not running")]
    NotRunning(String),

    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected runtime output: {0}")]
    Parse(String),

    #[error("Invalid container spec: {0}")]
    InvalidSpec(String),

    #[error("Failed to read container counters: {0}")]
    Stats(#[from] sandbox_cgroups::error::Error),
}

impl Error {
    /// The container does not exist (any more).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
