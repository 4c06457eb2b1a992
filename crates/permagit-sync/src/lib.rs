//! # Permagit Sync
//!
//! High-level fetch and push flows between a remote's working directory and
//! the ledger.
//!
//! ## Fetch
//!
//! [`SyncOrchestrator::download_repo`] resolves the repository descriptor,
//! reuses a fresh cache entry when one exists, and otherwise downloads the
//! snapshot archive, unpacks it and converts it into a bare repository.
//! Archives of private repositories pass through a [`RepoCipher`] first.
//!
//! ## Push
//!
//! [`SyncOrchestrator::upload_repo`] marks the current snapshot dirty, packs
//! the local repository, uploads it through an [`UploadChain`] and publishes
//! the resulting blob id. The dirty marker is only cleared once the ledger
//! acknowledges the new snapshot.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
mod error;
mod git;
mod orchestrator;
mod progress;
mod upload;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{
    BlobDownloader, Consent, ConsentPrompt, MetadataClient, NoPrompt, NoTelemetry, PricingClient,
    PublishAck, PushHook, RepoCipher, Telemetry, TelemetryEvent, UploadProvider, Vcs,
};
pub use error::{BoxError, ProviderFailure, Result, SyncError, UploadError};
pub use git::{GitCli, REPOSITORY_ENV};
pub use orchestrator::{PushOutcome, SyncOrchestrator, METADATA_CACHE_DIR};
pub use progress::{ProgressCallback, ProgressUpdate, SyncPhase, SyncProgress};
pub use upload::{UploadChain, Uploaded};
