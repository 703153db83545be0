//! Path allowlist enforcement.
//!
//! Every file the core touches — provider caches, the rate-limit counter,
//! the first-seen state file, the RSS output — must resolve inside one of
//! a small set of roots. The check runs once, at configuration time, so a
//! misconfigured `OUT_PATH` or `STATE_PATH` fails fast instead of silently
//! writing (or reading) somewhere unexpected.

use std::path::{Path, PathBuf};

use crate::error::{CommonError, Result};

/// Roots under which all core file I/O must resolve, after symlink
/// resolution. Compile-time and intentionally small.
pub const ALLOWED_ROOTS: &[&str] = &["docs", "data", "log"];

/// Resolve `configured` against `base_dir` and verify the result falls
/// under one of [`ALLOWED_ROOTS`]. The parent directory of `configured`
/// must already exist (it is canonicalized to resolve symlinks); the file
/// itself need not exist yet.
pub fn guard_path(base_dir: &Path, configured: &Path) -> Result<PathBuf> {
    let joined = if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        base_dir.join(configured)
    };

    let parent = joined.parent().unwrap_or(base_dir);
    std::fs::create_dir_all(parent)?;
    let canon_parent = parent.canonicalize()?;
    let canon_base = base_dir.canonicalize()?;

    let file_name = joined.file_name().ok_or_else(|| {
        CommonError::Config(format!("'{}' has no file name component", joined.display()))
    })?;
    let resolved = canon_parent.join(file_name);

    let relative = canon_parent.strip_prefix(&canon_base).map_err(|_| {
        CommonError::PathNotAllowed {
            path: joined.display().to_string(),
            allowed: ALLOWED_ROOTS,
        }
    })?;

    let first_component = relative
        .components()
        .next()
        .and_then(|c| c.as_os_str().to_str());

    match first_component {
        Some(root) if ALLOWED_ROOTS.contains(&root) => Ok(resolved),
        // `canon_parent == canon_base` happens when `configured` names a file
        // directly under one of the allowed roots (e.g. base_dir is already
        // "data/municipal" and configured is "events.json").
        None if ALLOWED_ROOTS.iter().any(|r| canon_base.ends_with(r)) => Ok(resolved),
        _ => Err(CommonError::PathNotAllowed {
            path: joined.display().to_string(),
            allowed: ALLOWED_ROOTS,
        }),
    }
}
