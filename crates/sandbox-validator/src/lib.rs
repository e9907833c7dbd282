//! Static validation of submitted Python code.
//!
//! The validator parses the submission into a syntax tree and reports every
//! forbidden import, dangerous builtin and interpreter-introspection access it
//! finds. It is a pre-filter: container isolation remains the enforcement layer.

pub mod denylist;
pub mod validator;

pub use denylist::DenyClass;
pub use validator::{StaticCodeValidator, ValidationResult, MAX_SOURCE_BYTES};
