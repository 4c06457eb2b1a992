//! Error types for parsing shared values.

use thiserror::Error;

/// Errors raised while validating identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    /// The snapshot id cannot be used as a cache directory name.
    #[error("invalid snapshot id: '{0}'")]
    InvalidSnapshotId(String),

    /// The remote identifier is neither a repository id nor `owner/name`.
    #[error("invalid repository identifier: '{0}'")]
    InvalidRepoRef(String),
}

/// A specialized Result type for type validation.
pub type Result<T> = std::result::Result<T, TypesError>;
