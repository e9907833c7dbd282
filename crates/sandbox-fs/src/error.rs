//! Error types for filesystem operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in filesystem operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to prepare scratch workspace at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid mount: {0}")]
    Mount(String),

    #[error("Invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("Failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}
