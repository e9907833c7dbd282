//! Error types for cgroup operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading cgroup counters
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No cgroup found for pid {0}")]
    NoCgroup(u32),

    #[error("Metrics collection failed: {0}")]
    Metrics(String),
}

impl Error {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
