//! Archive error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while packing or unpacking archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Walking the source tree failed.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// The zip container was malformed or could not be written.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An entry would be written outside the destination directory.
    #[error("archive entry escapes destination: {0}")]
    UnsafePath(String),

    /// The destination already exists; unpacking requires a fresh directory.
    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
