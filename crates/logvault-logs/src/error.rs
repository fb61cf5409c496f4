//! Error types for the logging pipeline

use std::path::PathBuf;

/// Failure to move the active file out of the way.
///
/// Never fatal: the writer keeps appending to the current file.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("Failed to close {path} for rotation: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free rotation name for {path} after {attempts} attempts")]
    NamesExhausted { path: PathBuf, attempts: u32 },
}

/// Logging pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log sink is closed")]
    Closed,

    #[error("Logging initialization failed: {0}")]
    Init(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for logging operations
pub type Result<T> = std::result::Result<T, LogError>;

impl LogError {
    pub fn init<S: Into<String>>(msg: S) -> Self {
        LogError::Init(msg.into())
    }
}

impl From<LogError> for std::io::Error {
    fn from(err: LogError) -> Self {
        match err {
            LogError::IoError(e) => e,
            LogError::Open { source, .. } => source,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
