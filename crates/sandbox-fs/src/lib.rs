//! Filesystem side of a sandboxed execution: the scratch directory holding the
//! submitted code, the mounts that expose it to the container, and result
//! artifacts written to the output directory.

use std::path::{Path, PathBuf};

pub mod artifact;
pub mod error;
pub mod workspace;

pub type Result<T> = std::result::Result<T, error::Error>;

pub use artifact::write_json_artifact;
pub use workspace::{ScratchWorkspace, CODE_MOUNT_TARGET, SCRIPT_NAME};

use crate::error::Error;

/// Host directory bind-mounted into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    /// Value for `--mount`.
    ///
    /// Sources containing a comma cannot be expressed in the mount syntax and
    /// are rejected instead of being split into extra options.
    pub fn mount_arg(&self) -> Result<String> {
        let source = self.source.to_str().ok_or_else(|| {
            Error::Mount(format!("source {} is not valid UTF-8", self.source.display()))
        })?;
        if source.contains(',') || self.target.contains(',') {
            return Err(Error::Mount(format!(
                "paths must not contain ',': {} -> {}",
                source, self.target
            )));
        }
        if !self.target.starts_with('/') {
            return Err(Error::Mount(format!(
                "target {} must be an absolute container path",
                self.target
            )));
        }
        let mut arg = format!("type=bind,source={},target={}", source, self.target);
        if self.read_only {
            arg.push_str(",readonly");
        }
        Ok(arg)
    }

    pub fn source_exists(&self) -> bool {
        Path::new(&self.source).is_dir()
    }
}

/// In-memory writable filesystem inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpfsMount {
    pub target: String,
    pub size_bytes: u64,
    pub options: String,
}

impl TmpfsMount {
    /// Value for `--tmpfs`, e.g. `/tmp:rw,noexec,nosuid,size=104857600`.
    pub fn mount_arg(&self) -> String {
        if self.options.is_empty() {
            format!("{}:size={}", self.target, self.size_bytes)
        } else {
            format!("{}:{},size={}", self.target, self.options, self.size_bytes)
        }
    }
}
