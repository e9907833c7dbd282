//! Error types for the sandbox core module.
//!
//! [`crate::ContainerExecutor::execute`] never returns these; failures inside
//! an execution are encoded in its result. They cover the surrounding
//! plumbing such as strategy producers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Strategy producer failed: {0}")]
    Producer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_message() {
        let err = Error::Producer("llm producer returned no code".to_string());
        assert_eq!(err.to_string(), "Strategy producer failed: llm producer returned no code");
    }
}
