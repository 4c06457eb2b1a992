//! Progress reporting for sync operations.

use std::sync::Arc;

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Progress update information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Phase the operation entered.
    pub phase: SyncPhase,
    /// Optional detail for the operator.
    pub message: Option<String>,
}

/// Phases of fetch and push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Serving a fetch from the local cache.
    UsingCache,
    /// Downloading a snapshot archive.
    Downloading,
    /// Unpacking a snapshot archive.
    Unpacking,
    /// Creating the bare repository.
    Cloning,
    /// Packing the local repository.
    Packing,
    /// Cost estimate available.
    Estimated,
    /// Uploading through one provider.
    Uploading,
    /// One provider failed; the next will be tried.
    ProviderFailed,
    /// Publishing the new snapshot to the ledger.
    Publishing,
    /// Operation finished.
    Complete,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UsingCache => write!(f, "Using cached repository"),
            Self::Downloading => write!(f, "Downloading repository"),
            Self::Unpacking => write!(f, "Unpacking repository"),
            Self::Cloning => write!(f, "Preparing bare repository"),
            Self::Packing => write!(f, "Packing repository"),
            Self::Estimated => write!(f, "Upload estimate"),
            Self::Uploading => write!(f, "Uploading repository"),
            Self::ProviderFailed => write!(f, "Upload provider failed"),
            Self::Publishing => write!(f, "Updating repository"),
            Self::Complete => write!(f, "Done"),
        }
    }
}

/// Shared progress notifier.
#[derive(Clone, Default)]
pub struct SyncProgress {
    callback: Option<Arc<ProgressCallback>>,
}

impl SyncProgress {
    /// Create a notifier that discards updates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier with a callback.
    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Report entering `phase`.
    pub fn phase(&self, phase: SyncPhase) {
        self.notify(phase, None);
    }

    /// Report `phase` with a detail message.
    pub fn message(&self, phase: SyncPhase, message: impl Into<String>) {
        self.notify(phase, Some(message.into()));
    }

    fn notify(&self, phase: SyncPhase, message: Option<String>) {
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate { phase, message });
        }
    }
}

impl std::fmt::Debug for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProgress")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
