//! Monitoring for sandbox containers.
//!
//! - [`ContainerMonitor`]: resource snapshots, orphan scan and cleanup
//! - [`RuntimeSecurityMonitor`]: background enforcement of resource policies
//! - [`SecurityEventLog`]: audit trail of enforcement actions
//! - [`SandboxMetrics`]: Prometheus gauges and counters
//! - [`OrphanReconciler`]: periodic orphan cleanup

pub mod background;
pub mod container;
pub mod error;
pub mod events;
pub mod metrics;
pub mod reconciler;
pub mod security;

pub use background::BackgroundLoop;
pub use container::{AlertMetric, ContainerMonitor, ResourceAlert};
pub use events::SecurityEventLog;
pub use metrics::SandboxMetrics;
pub use reconciler::OrphanReconciler;
pub use security::{HandlerResult, RuntimeSecurityMonitor, SecurityAlertHandler};

pub type Result<T> = std::result::Result<T, error::Error>;
