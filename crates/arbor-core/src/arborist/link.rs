//! Symlink detection and resolution for `node_modules` entries.

use crate::error::NodeError;
use std::path::{Path, PathBuf};

/// What a directory entry turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A plain directory; its content lives where it is.
    Dir,
    /// A symlink whose target resolved to this canonical path.
    Link(PathBuf),
}

/// Classify `path` and resolve it if it is a link.
///
/// # Errors
/// `ELOOP` for link cycles, `ENOENT` for dangling links, the native code
/// for anything else (e.g. `EACCES`).
pub async fn resolve_entry(path: &Path) -> Result<Entry, NodeError> {
    let meta = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| NodeError::from_io(path, &e))?;

    if !meta.file_type().is_symlink() {
        return Ok(Entry::Dir);
    }

    let real = realpath(path)
        .await
        .map_err(|e| NodeError::from_io(path, &e))?;
    Ok(Entry::Link(real))
}

/// Canonicalize without Windows verbatim prefixes.
pub async fn realpath(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(path).await?;
    Ok(dunce::simplified(&canonical).to_path_buf())
}
