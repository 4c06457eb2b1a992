//! Fetch and push flows.

use crate::adapters::{BlobDownloader, MetadataClient, PricingClient, PushHook, RepoCipher, Vcs};
use crate::progress::{SyncPhase, SyncProgress};
use crate::upload::UploadChain;
use crate::{Result, SyncError, UploadError};
use permagit_archive::IgnoreList;
use permagit_cache::CacheStore;
use permagit_types::{upload_tags, Estimate, RepoRef, RepositoryDescriptor, SnapshotId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Working directory subfolder reserved for the metadata client. Never pruned.
pub const METADATA_CACHE_DIR: &str = "cache";

const NO_CIPHER: &str = "no key configured for private repository";

/// Result of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The archive was uploaded and the ledger now points at it.
    Published {
        /// New snapshot id.
        snapshot_id: SnapshotId,
        /// Provider that stored the archive.
        provider: String,
    },
    /// The operator declined the cost prompt. Not a failure.
    Cancelled,
    /// Nothing was uploaded.
    Failed {
        /// What went wrong.
        reason: String,
    },
    /// The archive was stored but the ledger did not accept it.
    Unpublished {
        /// Id of the stored, unreferenced blob.
        blob_id: SnapshotId,
        /// What went wrong.
        reason: String,
    },
}

impl PushOutcome {
    /// Returns true if the ledger references the new snapshot.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    /// Returns true if the operator cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Composes the cache store, archive codec and remote adapters.
pub struct SyncOrchestrator {
    metadata: Arc<dyn MetadataClient>,
    downloader: Arc<dyn BlobDownloader>,
    pricing: Option<Arc<dyn PricingClient>>,
    cipher: Option<Arc<dyn RepoCipher>>,
    hooks: Vec<Arc<dyn PushHook>>,
    uploads: UploadChain,
    vcs: Arc<dyn Vcs>,
    progress: SyncProgress,
    creator: String,
}

impl SyncOrchestrator {
    /// Create an orchestrator over the given adapters.
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        downloader: Arc<dyn BlobDownloader>,
        uploads: UploadChain,
        vcs: Arc<dyn Vcs>,
    ) -> Self {
        Self {
            metadata,
            downloader,
            pricing: None,
            cipher: None,
            hooks: Vec::new(),
            uploads,
            vcs,
            progress: SyncProgress::new(),
            creator: String::new(),
        }
    }

    /// Set the cost estimator consulted before uploads.
    pub fn with_pricing(mut self, pricing: Arc<dyn PricingClient>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Set the cipher used for private repositories.
    pub fn with_cipher(mut self, cipher: Arc<dyn RepoCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Add a hook run after every published push.
    pub fn with_push_hook(mut self, hook: Arc<dyn PushHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Set the progress notifier.
    pub fn with_progress(mut self, progress: SyncProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Set the address written into upload `Creator` tags.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Looks up a repository descriptor.
    pub async fn resolve(&self, repo: &RepoRef) -> Result<RepositoryDescriptor> {
        match self.metadata.resolve(repo).await {
            Ok(Some(descriptor)) => Ok(descriptor),
            Ok(None) => Err(SyncError::RepositoryNotFound(repo.to_string())),
            Err(e) => Err(SyncError::Metadata(e.to_string())),
        }
    }

    /// Makes the latest snapshot of `repo` available as a bare repository
    /// at `store.entry_path(snapshot)`.
    ///
    /// A fresh entry is reused without downloading. On success every other
    /// snapshot is pruned from the working directory.
    pub async fn download_repo(
        &self,
        repo: &RepoRef,
        store: &CacheStore,
    ) -> Result<RepositoryDescriptor> {
        let descriptor = self.resolve(repo).await?;
        let snapshot = descriptor.snapshot_id.clone();

        if store.is_fresh(&snapshot) {
            tracing::info!(snapshot = %snapshot, "Using cached repository");
            self.progress.phase(SyncPhase::UsingCache);
            return Ok(descriptor);
        }

        if store.has_entry(&snapshot) {
            tracing::info!(snapshot = %snapshot, "Discarding dirty cache entry");
            if let Err(e) = store.remove_entry(&snapshot) {
                tracing::warn!(snapshot = %snapshot, error = %e, "Failed to remove dirty entry");
            }
        }

        self.progress.phase(SyncPhase::Downloading);
        let data = match self.downloader.download(&snapshot).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(SyncError::Download {
                    snapshot,
                    reason: "blob not found".to_string(),
                })
            }
            Err(e) => {
                return Err(SyncError::Download {
                    snapshot,
                    reason: e.to_string(),
                })
            }
        };
        tracing::debug!(snapshot = %snapshot, bytes = data.len(), "Downloaded snapshot");

        let data = if descriptor.private {
            match self.cipher(&descriptor)?.decrypt(&descriptor, data).await {
                Ok(data) => data,
                Err(e) => {
                    return Err(SyncError::Decrypt {
                        snapshot,
                        reason: e.to_string(),
                    })
                }
            }
        } else {
            data
        };

        self.progress.phase(SyncPhase::Unpacking);
        let staging = store.root().join(format!(".unpack-{snapshot}"));
        remove_stale(&staging);
        let result = match unpack_blocking(data, staging.clone()).await {
            Ok(()) => self.materialize(&descriptor, &staging, store).await,
            Err(reason) => Err(SyncError::Unpack {
                snapshot: snapshot.clone(),
                reason,
            }),
        };
        remove_stale(&staging);
        result?;

        if let Err(e) = store.clear_dirty(&snapshot) {
            tracing::warn!(snapshot = %snapshot, error = %e, "Failed to clear dirty marker");
        }
        store.prune(&[snapshot.as_str(), METADATA_CACHE_DIR]);
        self.progress.phase(SyncPhase::Complete);
        Ok(descriptor)
    }

    /// Packs the repository rooted at `source` and publishes it as the new
    /// snapshot of `descriptor`.
    ///
    /// The current snapshot is marked dirty first and stays dirty unless the
    /// ledger acknowledges the new one.
    pub async fn upload_repo(
        &self,
        source: &Path,
        descriptor: &RepositoryDescriptor,
        store: &CacheStore,
    ) -> PushOutcome {
        let current = &descriptor.snapshot_id;
        if let Err(e) = store.mark_dirty(current) {
            tracing::warn!(snapshot = %current, error = %e, "Failed to mark cache entry dirty");
        }

        self.progress.phase(SyncPhase::Packing);
        let data = match self.pack(source, descriptor, store).await {
            Ok(data) => data,
            Err(reason) => {
                tracing::error!(error = %reason, "Failed to pack repository");
                return PushOutcome::Failed { reason };
            }
        };

        let data = if descriptor.private {
            let sealed = match &self.cipher {
                Some(cipher) => cipher
                    .encrypt(descriptor, data)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err(NO_CIPHER.to_string()),
            };
            match sealed {
                Ok(data) => data,
                Err(reason) => {
                    tracing::error!(error = %reason, "Failed to encrypt repository");
                    return PushOutcome::Failed { reason };
                }
            }
        } else {
            data
        };

        let estimate = self.estimate(data.len() as u64).await;
        let tags = upload_tags(descriptor, &self.creator);
        let uploaded = match self
            .uploads
            .upload(&data, &tags, estimate.as_ref(), &self.progress)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(UploadError::Cancelled) => return PushOutcome::Cancelled,
            Err(e) => {
                return PushOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.progress.phase(SyncPhase::Publishing);
        let reason = match self.metadata.publish(&descriptor.id, &uploaded.blob_id).await {
            Ok(ack) if ack.accepted_id == descriptor.id => None,
            Ok(ack) => Some(format!(
                "ledger updated repository {} instead of {}",
                ack.accepted_id, descriptor.id
            )),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            tracing::error!(blob = %uploaded.blob_id, error = %reason, "Snapshot upload not published");
            return PushOutcome::Unpublished {
                blob_id: uploaded.blob_id,
                reason,
            };
        }

        store.prune(&[METADATA_CACHE_DIR]);
        if let Err(e) = store.clear_dirty(current) {
            tracing::warn!(snapshot = %current, error = %e, "Failed to clear dirty marker");
        }
        tracing::info!(repository = %descriptor.id, snapshot = %uploaded.blob_id, "Snapshot published");
        for hook in &self.hooks {
            hook.after_publish(descriptor).await;
        }
        self.progress.phase(SyncPhase::Complete);

        PushOutcome::Published {
            snapshot_id: uploaded.blob_id,
            provider: uploaded.provider,
        }
    }

    async fn pack(
        &self,
        source: &Path,
        descriptor: &RepositoryDescriptor,
        store: &CacheStore,
    ) -> std::result::Result<Vec<u8>, String> {
        check_component(&descriptor.name)?;

        let scratch = store
            .root()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let ignore = IgnoreList::new(scratch).with_gitignore(source);
        let source = source.to_path_buf();
        let prefix = descriptor.name.clone();

        tokio::task::spawn_blocking(move || permagit_archive::pack(&source, &prefix, &ignore))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }

    fn cipher(&self, descriptor: &RepositoryDescriptor) -> Result<&Arc<dyn RepoCipher>> {
        self.cipher.as_ref().ok_or_else(|| SyncError::Decrypt {
            snapshot: descriptor.snapshot_id.clone(),
            reason: NO_CIPHER.to_string(),
        })
    }

    async fn estimate(&self, bytes: u64) -> Option<Estimate> {
        let pricing = self.pricing.as_ref()?;
        match pricing.estimate(bytes).await {
            Ok(estimate) => {
                self.progress.message(
                    SyncPhase::Estimated,
                    format!(
                        "{} (~{:.6} AR, ${:.4})",
                        estimate.human_size,
                        estimate.cost_native,
                        estimate.fiat_or_zero()
                    ),
                );
                Some(estimate)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to estimate upload cost");
                None
            }
        }
    }

    /// Turns the unpacked archive at `staging` into the bare cache entry.
    async fn materialize(
        &self,
        descriptor: &RepositoryDescriptor,
        staging: &Path,
        store: &CacheStore,
    ) -> Result<()> {
        let snapshot = &descriptor.snapshot_id;
        let tree = self
            .locate_tree(descriptor, staging)
            .await
            .map_err(|reason| SyncError::Unpack {
                snapshot: snapshot.clone(),
                reason,
            })?;

        self.progress.phase(SyncPhase::Cloning);
        let bare_clone_error = |reason: String| SyncError::BareClone {
            snapshot: snapshot.clone(),
            reason,
        };

        let partial = store.root().join(format!(".{snapshot}.partial"));
        remove_stale(&partial);
        if let Err(e) = self.vcs.bare_clone(&tree, &partial).await {
            remove_stale(&partial);
            return Err(bare_clone_error(e.to_string()));
        }

        let entry = store.entry_path(snapshot);
        let promoted = store
            .remove_entry(snapshot)
            .map_err(|e| e.to_string())
            .and_then(|()| std::fs::rename(&partial, &entry).map_err(|e| e.to_string()));
        if let Err(reason) = promoted {
            remove_stale(&partial);
            return Err(bare_clone_error(reason));
        }
        Ok(())
    }

    /// Finds the repository root inside an unpacked archive, renaming it to
    /// the descriptor's name when the archive was packed under another one.
    async fn locate_tree(
        &self,
        descriptor: &RepositoryDescriptor,
        staging: &Path,
    ) -> std::result::Result<PathBuf, String> {
        check_component(&descriptor.name)?;
        let expected = staging.join(&descriptor.name);
        if expected.is_dir() {
            return Ok(expected);
        }

        let mut found = None;
        if let Some(parent_id) = &descriptor.fork_of {
            found = self.parent_tree(parent_id, staging).await;
        }
        let found = found
            .or_else(|| single_top_level_dir(staging))
            .ok_or_else(|| format!("archive has no '{}' folder", descriptor.name))?;

        tracing::debug!(
            from = %found.display(),
            to = %expected.display(),
            "Renaming archive root"
        );
        std::fs::rename(&found, &expected).map_err(|e| e.to_string())?;
        Ok(expected)
    }

    async fn parent_tree(&self, parent_id: &str, staging: &Path) -> Option<PathBuf> {
        match self.metadata.resolve(&RepoRef::Id(parent_id.to_string())).await {
            Ok(Some(parent)) if check_component(&parent.name).is_ok() => {
                let path = staging.join(&parent.name);
                path.is_dir().then_some(path)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(parent = %parent_id, error = %e, "Failed to resolve fork parent");
                None
            }
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("providers", &self.uploads.provider_names())
            .field("creator", &self.creator)
            .finish_non_exhaustive()
    }
}

async fn unpack_blocking(data: Vec<u8>, dest: PathBuf) -> std::result::Result<(), String> {
    tokio::task::spawn_blocking(move || permagit_archive::unpack(&data, &dest))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

fn check_component(name: &str) -> std::result::Result<(), String> {
    let unsafe_name =
        name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(format!("invalid repository name '{name}'"));
    }
    Ok(())
}

fn single_top_level_dir(staging: &Path) -> Option<PathBuf> {
    let mut dirs = std::fs::read_dir(staging)
        .ok()?
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false));
    let first = dirs.next()?;
    dirs.next().is_none().then(|| first.path())
}

fn remove_stale(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch directory"),
    }
}
