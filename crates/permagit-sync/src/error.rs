//! Synchronization error types.

use permagit_types::SnapshotId;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that end a fetch attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The repository does not exist remotely. An expected outcome, not a bug.
    #[error("repository '{0}' not found")]
    RepositoryNotFound(String),

    /// The ledger could not be queried. Reported like a missing repository.
    #[error("failed to query repository metadata: {0}")]
    Metadata(String),

    /// The snapshot archive could not be downloaded.
    #[error("failed to download snapshot {snapshot}: {reason}")]
    Download {
        /// Snapshot being fetched.
        snapshot: SnapshotId,
        /// What went wrong.
        reason: String,
    },

    /// The downloaded archive of a private repository could not be decrypted.
    #[error("failed to decrypt snapshot {snapshot}: {reason}")]
    Decrypt {
        /// Snapshot being fetched.
        snapshot: SnapshotId,
        /// What went wrong.
        reason: String,
    },

    /// The downloaded archive could not be unpacked.
    #[error("failed to unpack snapshot {snapshot}: {reason}")]
    Unpack {
        /// Snapshot being fetched.
        snapshot: SnapshotId,
        /// What went wrong.
        reason: String,
    },

    /// The unpacked tree could not be turned into a bare repository.
    #[error("failed to prepare bare repository for snapshot {snapshot}: {reason}")]
    BareClone {
        /// Snapshot being fetched.
        snapshot: SnapshotId,
        /// What went wrong.
        reason: String,
    },

    /// The working directory is unusable.
    #[error(transparent)]
    Cache(#[from] permagit_cache::CacheError),
}

impl SyncError {
    /// Process exit status for this error.
    ///
    /// A repository that cannot be resolved, whether absent or because the
    /// ledger is unreachable, ends the helper cleanly; everything else is a
    /// failure the invoking client must see.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RepositoryNotFound(_) | Self::Metadata(_) => 0,
            _ => 1,
        }
    }
}

/// A single provider's failed upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,
    /// Error text reported by the provider.
    pub error: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Errors from the upload provider chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    /// No providers are configured.
    #[error("no upload providers configured")]
    NoProviders,

    /// The operator declined the cost prompt.
    #[error("upload cancelled by operator")]
    Cancelled,

    /// Every provider was tried once and failed.
    #[error("all upload providers failed: {}", join_failures(.0))]
    Exhausted(Vec<ProviderFailure>),
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialized Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
