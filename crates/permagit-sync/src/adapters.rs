//! Seams to the outside world.
//!
//! Every network and process dependency of the sync flows sits behind one of
//! these traits so the flows can be driven by in-memory fakes.

use crate::BoxError;
use async_trait::async_trait;
use permagit_types::{Estimate, RepoRef, RepositoryDescriptor, SnapshotId, Tag};
use std::path::Path;

/// Acknowledgement of a snapshot publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    /// Repository id the ledger applied the update to.
    pub accepted_id: String,
}

/// Ledger metadata access.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Looks up a repository descriptor. `Ok(None)` means it does not exist.
    async fn resolve(&self, repo: &RepoRef) -> Result<Option<RepositoryDescriptor>, BoxError>;

    /// Proposes `snapshot` as the new latest snapshot of `repository_id`.
    async fn publish(
        &self,
        repository_id: &str,
        snapshot: &SnapshotId,
    ) -> Result<PublishAck, BoxError>;
}

/// Content-addressed blob retrieval.
#[async_trait]
pub trait BlobDownloader: Send + Sync {
    /// Fetches a blob. `Ok(None)` means the store does not hold it.
    async fn download(&self, id: &SnapshotId) -> Result<Option<Vec<u8>>, BoxError>;
}

/// One backend able to store a blob.
#[async_trait]
pub trait UploadProvider: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Largest archive, in bytes, this provider stores at no cost.
    fn free_tier_bytes(&self) -> u64 {
        0
    }

    /// Makes exactly one upload attempt and returns the new blob id.
    async fn upload_once(&self, data: &[u8], tags: &[Tag]) -> Result<String, BoxError>;
}

/// Storage cost estimation.
#[async_trait]
pub trait PricingClient: Send + Sync {
    /// Estimates the cost of storing `bytes` bytes.
    async fn estimate(&self, bytes: u64) -> Result<Estimate, BoxError>;
}

/// Operator answer to a cost prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    /// The operator agreed.
    Granted,
    /// The operator declined.
    Declined,
    /// No interactive terminal is attached; nobody can be asked.
    Unavailable,
}

/// Interactive confirmation.
///
/// Implementations must never read the process's standard input, which
/// belongs to the remote-helper protocol.
pub trait ConsentPrompt: Send + Sync {
    /// Asks `question` and waits for the answer. May block.
    fn ask(&self, question: &str) -> Consent;
}

/// Prompt for non-interactive contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl ConsentPrompt for NoPrompt {
    fn ask(&self, _question: &str) -> Consent {
        Consent::Unavailable
    }
}

/// Symmetric encryption of private repository archives.
#[async_trait]
pub trait RepoCipher: Send + Sync {
    /// Decrypts a downloaded archive of `repo`.
    async fn decrypt(&self, repo: &RepositoryDescriptor, data: Vec<u8>)
        -> Result<Vec<u8>, BoxError>;

    /// Encrypts a packed archive of `repo` before upload.
    async fn encrypt(&self, repo: &RepositoryDescriptor, data: Vec<u8>)
        -> Result<Vec<u8>, BoxError>;
}

/// Follow-up work after a snapshot is published.
///
/// Runs best-effort: implementations log and swallow their own errors.
#[async_trait]
pub trait PushHook: Send + Sync {
    /// Called once the ledger references the new snapshot of `repo`.
    async fn after_publish(&self, repo: &RepositoryDescriptor);
}

/// Version control operations the flows depend on.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Creates a bare repository at `dest` from the working tree at `source`.
    async fn bare_clone(&self, source: &Path, dest: &Path) -> Result<(), BoxError>;

    /// Points `remote` of the repository at `repo_dir` to `url`.
    async fn set_remote_url(&self, repo_dir: &Path, remote: &str, url: &str)
        -> Result<(), BoxError>;
}

/// Usage events reported to analytics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// A clone or fetch finished.
    Fetched {
        /// Repository id.
        repository_id: String,
        /// Whether the fetch succeeded.
        success: bool,
    },
    /// A push attempt finished.
    Pushed {
        /// Repository id.
        repository_id: String,
        /// Whether the snapshot was published.
        success: bool,
    },
}

/// Best-effort analytics sink. Implementations swallow their own errors.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Records one event.
    async fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

#[async_trait]
impl Telemetry for NoTelemetry {
    async fn record(&self, _event: TelemetryEvent) {}
}
