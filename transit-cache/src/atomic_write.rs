//! Atomic file write: write to a sibling temp file in the same directory,
//! `fsync` it, rename over the target, then best-effort `fsync` the
//! directory entry. Grounded in
//! `danielchristiancazares-forge/utils/src/atomic_write.rs`, trimmed of the
//! owner-only permission and Windows ACL handling that crate needs for
//! credential files — this crate's cache, first-seen and counter files
//! are not secrets.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, Result};

pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_err(path, e))?;
    tmp.write_all(bytes).map_err(|e| io_err(path, e))?;
    tmp.as_file().sync_all().map_err(|e| io_err(path, e))?;
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;

    best_effort_sync_dir(parent);
    Ok(())
}

fn best_effort_sync_dir(parent: &Path) {
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        debug!(path = %parent.display(), "directory fsync failed (best-effort): {e}");
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read a file to a string, returning `None` if it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}
