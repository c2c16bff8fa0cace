//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! reduce duplicated `create_dir_all` / parent-directory checks.

use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir_sync(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            ensure_dir_all_sync_with_op("creating directory", parent)
        }
        _ => Ok(()),
    }
}

/// Replace `path` with `bytes` atomically.
///
/// The bytes go to a temp file in the same directory, which is synced and then
/// renamed over the target. Readers see either the old or the new file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir_sync(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error("creating temp file in", dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| io_error("writing temp file for", path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing temp file for", path, e))?;
    tmp.persist(path)
        .map_err(|e| io_error("renaming temp file over", path, e.error))?;
    Ok(())
}
