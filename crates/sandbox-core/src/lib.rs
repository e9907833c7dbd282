//! Sandboxed execution of untrusted strategy code.
//!
//! [`ContainerExecutor`] runs one submission in one ephemeral container and
//! always returns an [`sandbox_proto::ExecutionResult`]. [`CleanupPolicy`]
//! holds the ordered removal strategies used during teardown, and the
//! [`producer`] module abstracts over where submissions come from.

pub mod cleanup;
pub mod error;
pub mod executor;
pub mod producer;

pub use cleanup::{CleanupPolicy, RemovalStrategy};
pub use executor::{ContainerExecutor, ExecuteOptions};
pub use producer::{
    choose_method, run_iteration, run_iteration_with, GenerationMethod, IterationOutcome, StrategyProducer,
    StrategySource,
};

pub type Result<T> = std::result::Result<T, error::Error>;
