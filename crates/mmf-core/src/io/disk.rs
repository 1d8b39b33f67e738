use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{MmfError, Result};

/// Staging path a writer fills before the final rename.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Delete `path` and its staging file if present, so a fresh run can never
/// be confused with leftovers of a failed one. Returns whether anything was
/// removed.
pub fn remove_stale(path: &Path) -> Result<bool> {
    let mut removed = false;
    for candidate in [path.to_path_buf(), partial_path(path)] {
        if candidate.exists() {
            fs::remove_file(&candidate)?;
            debug!(path = %candidate.display(), "Removed stale file");
            removed = true;
        }
    }
    Ok(removed)
}

/// Remove superseded intermediates, ignoring ones that are already gone.
pub fn cleanup(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if path.exists() {
            fs::remove_file(path)?;
            info!(path = %path.display(), "Deleted intermediate");
        }
    }
    Ok(())
}

/// Bytes available to unprivileged writers on the volume holding `path`.
pub fn available_space(path: &Path) -> Result<u64> {
    let probe = existing_ancestor(path);
    Ok(fs2::available_space(probe)?)
}

/// Fail before allocation unless `required · margin` bytes are free.
pub fn ensure_free_space(path: &Path, required: u64, margin: f64) -> Result<()> {
    let available = available_space(path)?;
    let needed = (required as f64 * margin).ceil() as u64;
    debug!(
        path = %path.display(),
        required,
        needed,
        available,
        "Disk space check"
    );
    if available < needed {
        return Err(MmfError::InsufficientSpace {
            path: path.to_path_buf(),
            required: needed,
            available,
        });
    }
    Ok(())
}

fn existing_ancestor(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}
