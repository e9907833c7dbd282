//! Result artifacts written to the configured output directory.

use crate::error::Error;
use crate::Result;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `value` as pretty JSON to `dir/<name>.json`.
///
/// The file is written to a temporary sibling and renamed into place, so
/// readers never observe a partial document.
pub fn write_json_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    if name.is_empty() || name.contains(|c| c == '/' || c == '\\') || name.starts_with('.') {
        return Err(Error::InvalidName(name.to_string()));
    }
    fs::create_dir_all(dir).map_err(|e| Error::Workspace {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let target = dir.join(format!("{}.json", name));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(&target).map_err(|e| Error::Io(e.error))?;

    info!("Wrote artifact {}", target.display());
    Ok(target)
}
