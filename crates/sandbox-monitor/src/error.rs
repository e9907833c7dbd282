//! Error types for monitoring operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Container runtime error: {0}")]
    Runtime(#[from] sandbox_runtime::error::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Metrics endpoint error: {0}")]
    Endpoint(#[from] std::io::Error),
}
