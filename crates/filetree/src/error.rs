//! Error types for the tree synchronizer

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A directory could not be listed.
///
/// Scan errors never reach refresh callers. They are stored on the affected
/// directory and shown in place of its children until a later refresh
/// succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("{}: no such file or directory", path.display())]
    NotFound { path: PathBuf },
    #[error("{}: permission denied", path.display())]
    PermissionDenied { path: PathBuf },
    #[error("{}: not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("{}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ScanError {
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => ScanError::NotFound { path },
            io::ErrorKind::PermissionDenied => ScanError::PermissionDenied { path },
            _ => ScanError::Io {
                path,
                message: err.to_string(),
            },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScanError::NotFound { path }
            | ScanError::PermissionDenied { path }
            | ScanError::NotADirectory { path }
            | ScanError::Io { path, .. } => path,
        }
    }
}

/// Errors returned by the public tree surface.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("load requires an absolute path, got {}", .0.display())]
    NotAbsolute(PathBuf),
}
