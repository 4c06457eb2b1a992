//! Cache error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The working directory could not be created or is not a directory.
    #[error("unusable working directory {}: {reason}", path.display())]
    WorkingDirectory {
        /// The requested working directory.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A specialized Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
