//! Loading an operator-supplied security profile from disk.

use crate::error::Error;
use crate::Result;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A security profile file that exists and parses as a JSON object.
///
/// The document is handed to the runtime by path; its contents are only
/// checked for shape.
#[derive(Debug, Clone)]
pub struct SecurityProfile {
    path: PathBuf,
    document: Value,
}

impl SecurityProfile {
    /// Load the profile at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist. A file that exists but
    /// is not a JSON object is an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let document: Value = serde_json::from_str(&text).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        check_shape(path, &document)?;

        let path = fs::canonicalize(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Loaded security profile {}", path.display());
        Ok(Some(Self { path, document }))
    }

    /// Absolute path of the profile file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Number of syscall rules, when the document lists any.
    pub fn rule_count(&self) -> usize {
        self.document
            .get("syscalls")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Value for `--security-opt`.
    pub fn security_opt(&self) -> String {
        format!("seccomp={}", self.path.display())
    }
}

fn check_shape(path: &Path, document: &Value) -> Result<()> {
    let malformed = |message: &str| Error::Malformed {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    let object = document
        .as_object()
        .ok_or_else(|| malformed("top level must be an object"))?;
    if let Some(action) = object.get("defaultAction") {
        if !action.is_string() {
            return Err(malformed("defaultAction must be a string"));
        }
    }
    if let Some(syscalls) = object.get("syscalls") {
        if !syscalls.is_array() {
            return Err(malformed("syscalls must be an array"));
        }
    }
    Ok(())
}
