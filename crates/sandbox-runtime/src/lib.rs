//! The isolation layer seam.
//!
//! [`ContainerRuntime`] is the narrow set of container operations the
//! executor and monitors need. [`DockerCli`] implements it over the docker
//! (or podman) command line; tests substitute an in-memory runtime.

use async_trait::async_trait;
use std::time::Duration;

pub mod docker;
pub mod error;
pub mod spec;

pub use docker::{create_args, DockerCli};
pub use spec::{ContainerInfo, ContainerSpec, ContainerSummary, ListFilter, RawStats};

pub type Result<T> = std::result::Result<T, error::Error>;

/// Label marking containers created by this system.
pub const MANAGED_LABEL: &str = "io.sbx.managed";
pub const MANAGED_LABEL_VALUE: &str = "true";

/// Label carrying the execution id that owns a container.
pub const EXECUTION_LABEL: &str = "io.sbx.execution-id";

/// Filter matching every container this system owns.
pub fn managed_filter() -> ListFilter {
    ListFilter::default().label(MANAGED_LABEL, MANAGED_LABEL_VALUE)
}

/// Container lifecycle operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short name for logs, e.g. `docker`
    fn name(&self) -> &str;

    /// Check that the engine answers.
    async fn ping(&self) -> Result<()>;

    /// Create a container without starting it; returns its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    /// Block until the container exits; returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64>;

    /// Combined stdout and stderr of the container, interleaved by time.
    async fn logs(&self, id: &str) -> Result<String>;

    /// Send the stop signal, then kill after `grace`.
    async fn stop(&self, id: &str, grace: Duration) -> Result<()>;

    async fn kill(&self, id: &str) -> Result<()>;

    async fn remove(&self, id: &str, force: bool) -> Result<()>;

    /// `Ok(None)` when the container does not exist.
    async fn inspect(&self, id: &str) -> Result<Option<ContainerInfo>>;

    /// All containers matching `filter`, in one engine call.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerSummary>>;

    /// Two counter samples of a running container.
    async fn stats(&self, id: &str) -> Result<RawStats>;
}
