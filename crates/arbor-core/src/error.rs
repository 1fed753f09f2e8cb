//! Error types for tree loading.
//!
//! Two layers: [`ArboristError`] is fatal and ends a load, [`NodeError`] is a
//! diagnostic attached to a single node while the walk carries on.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    /// Missing file, entry or directory (also: dangling symlink).
    pub const ENOENT: &str = "ENOENT";
    /// Manifest exists but is not a JSON object.
    pub const EJSONPARSE: &str = "EJSONPARSE";
    /// Symlink cycle.
    pub const ELOOP: &str = "ELOOP";
    /// Declared dependency with no resolvable installed node.
    pub const EMISSINGDEP: &str = "EMISSINGDEP";
    /// Loaded tree failed the integrity check.
    pub const ETREECHECK: &str = "ETREECHECK";
    /// `yarn.lock` text that does not parse.
    pub const EYARNLOCK: &str = "EYARNLOCK";
    pub const EACCES: &str = "EACCES";
    pub const EPERM: &str = "EPERM";
    pub const ENOTDIR: &str = "ENOTDIR";
    pub const EIO: &str = "EIO";
}

/// Map an I/O error onto one of the stable codes.
#[must_use]
pub fn io_code(err: &io::Error) -> &'static str {
    #[cfg(unix)]
    {
        if let Some(raw) = err.raw_os_error() {
            match raw {
                libc::ELOOP => return codes::ELOOP,
                libc::ENOENT => return codes::ENOENT,
                libc::ENOTDIR => return codes::ENOTDIR,
                libc::EACCES => return codes::EACCES,
                libc::EPERM => return codes::EPERM,
                _ => {}
            }
        }
    }

    match err.kind() {
        io::ErrorKind::NotFound => codes::ENOENT,
        io::ErrorKind::PermissionDenied => codes::EACCES,
        _ => codes::EIO,
    }
}

/// Fatal failure of a load.
#[derive(Error, Debug, Clone)]
pub enum ArboristError {
    #[error("ENOENT: no such directory: {}", path.display())]
    RootNotFound { path: PathBuf },

    #[error("ENOTDIR: not a directory: {}", path.display())]
    RootNotDirectory { path: PathBuf },

    #[error("{code}: {message}: {}", path.display())]
    Io {
        code: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("ETREECHECK: {message}: {}", path.display())]
    TreeCheck { path: PathBuf, message: String },
}

impl ArboristError {
    /// Build the error for a root path that could not be stat'd or canonicalized.
    #[must_use]
    pub fn root_io(path: &Path, err: &io::Error) -> Self {
        match io_code(err) {
            codes::ENOENT => Self::RootNotFound {
                path: path.to_path_buf(),
            },
            codes::ENOTDIR => Self::RootNotDirectory {
                path: path.to_path_buf(),
            },
            code => Self::Io {
                code,
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    #[must_use]
    pub fn tree_check(path: &Path, message: impl Into<String>) -> Self {
        Self::TreeCheck {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RootNotFound { .. } => codes::ENOENT,
            Self::RootNotDirectory { .. } => codes::ENOTDIR,
            Self::Io { code, .. } => code,
            Self::TreeCheck { .. } => codes::ETREECHECK,
        }
    }

    /// Path the failure is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::RootNotFound { path }
            | Self::RootNotDirectory { path }
            | Self::Io { path, .. }
            | Self::TreeCheck { path, .. } => path,
        }
    }
}

/// A diagnostic recorded on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    /// Stable error code.
    pub code: String,
    /// Path the diagnostic is about.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// `name@range` of the unmet dependency, for `EMISSINGDEP`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dependency: Option<String>,
}

impl NodeError {
    #[must_use]
    pub fn new(code: &str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
            dependency: None,
        }
    }

    /// Wrap a filesystem error, keeping its native code.
    #[must_use]
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        Self::new(io_code(err), path, err.to_string())
    }

    #[must_use]
    pub fn json_parse(path: &Path, message: impl Into<String>) -> Self {
        Self::new(codes::EJSONPARSE, path, message)
    }

    #[must_use]
    pub fn missing_dep(path: &Path, name: &str, range: &str) -> Self {
        Self {
            code: codes::EMISSINGDEP.to_string(),
            path: path.to_path_buf(),
            message: format!("missing dependency: {name}@{range}"),
            dependency: Some(format!("{name}@{range}")),
        }
    }
}
