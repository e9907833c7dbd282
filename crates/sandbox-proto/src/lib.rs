//! Types that cross component boundaries of the sandbox.
//!
//! The result marker protocol is the only channel a sandboxed program has for
//! handing structured data back to the executor.

pub mod event;
pub mod marker;
pub mod result;
pub mod snapshot;

pub use event::{EnforcementAction, SecurityEvent, ViolationDetails, ViolationKind};
pub use marker::{extract_payload, wrap_payload, MarkerError, SIGNAL_END_MARKER, SIGNAL_START_MARKER};
pub use result::{ExecutionErrorKind, ExecutionResult};
pub use snapshot::{memory_percent, ContainerSnapshot, ContainerStatus};
