//! Error types for security profile operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in security profile operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Security profile {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Security profile {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Failed to serialize security profile: {0}")]
    Serialize(#[from] serde_json::Error),
}
