//! Per-execution scratch directory holding the submitted source.

use crate::error::Error;
use crate::{BindMount, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Container path the scratch directory is mounted at.
pub const CODE_MOUNT_TARGET: &str = "/sandbox/code";

/// File name of the submitted source inside the scratch directory.
pub const SCRIPT_NAME: &str = "strategy.py";

/// Scratch directory owned by one execution.
///
/// The directory is removed by [`ScratchWorkspace::remove`] or, failing that,
/// when the value is dropped.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
    script: PathBuf,
}

impl ScratchWorkspace {
    /// Materialize `source` under the system temp directory.
    pub fn create(source: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sbx-code-")
            .tempdir()
            .map_err(Error::Io)?;
        Self::populate(dir, source)
    }

    /// Materialize `source` under `parent`.
    pub fn create_in(parent: &Path, source: &str) -> Result<Self> {
        fs::create_dir_all(parent).map_err(|e| Error::Workspace {
            path: parent.to_path_buf(),
            source: e,
        })?;
        let dir = tempfile::Builder::new()
            .prefix("sbx-code-")
            .tempdir_in(parent)
            .map_err(|e| Error::Workspace {
                path: parent.to_path_buf(),
                source: e,
            })?;
        Self::populate(dir, source)
    }

    fn populate(dir: TempDir, source: &str) -> Result<Self> {
        let script = dir.path().join(SCRIPT_NAME);
        fs::write(&script, source).map_err(|e| Error::Workspace {
            path: script.clone(),
            source: e,
        })?;

        // The container runs as an unprivileged uid that does not own these files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let chmod = |path: &Path, mode: u32| {
                fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
                    Error::Workspace {
                        path: path.to_path_buf(),
                        source: e,
                    }
                })
            };
            chmod(dir.path(), 0o755)?;
            chmod(&script, 0o644)?;
        }

        debug!("Prepared scratch workspace {}", dir.path().display());
        Ok(Self { dir, script })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Path of the script as seen from inside the container.
    pub fn container_script_path() -> String {
        format!("{}/{}", CODE_MOUNT_TARGET, SCRIPT_NAME)
    }

    /// Read-only mount exposing this workspace at [`CODE_MOUNT_TARGET`].
    pub fn bind_mount(&self) -> BindMount {
        BindMount::read_only(self.dir.path(), CODE_MOUNT_TARGET)
    }

    /// Delete the directory and everything in it.
    pub fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!("Failed to remove scratch workspace {}: {}", path.display(), e);
            Error::Workspace { path, source: e }
        })
    }
}
