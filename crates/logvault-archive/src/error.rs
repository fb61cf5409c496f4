//! Error types for archival runs

use std::path::{Path, PathBuf};

/// Archival error type
///
/// Recorded in the run report and logged; never returned to log callers.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundle verification failed for {path}: {reason}")]
    Verify { path: PathBuf, reason: String },

    #[error("Bundle already exists: {0}")]
    BundleExists(PathBuf),
}

/// Result type alias for archival operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn verify<S: Into<String>>(path: &Path, reason: S) -> Self {
        ArchiveError::Verify {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
