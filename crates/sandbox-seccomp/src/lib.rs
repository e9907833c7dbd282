//! Syscall-filtering security profiles handed to the container runtime.
//!
//! [`SecurityProfile`] loads an operator-supplied profile and checks that it
//! is a JSON document; its schema belongs to the runtime and is passed
//! through untouched. [`ProfileBuilder`] produces the default profile written
//! by `sbx profile`.

pub mod error;
pub mod filter;
pub mod profile;

pub use filter::{Action, ArgCondition, ArgOp, ProfileBuilder, SeccompProfile, SyscallRule};
pub use profile::SecurityProfile;

pub type Result<T> = std::result::Result<T, error::Error>;
