//! Ordered upload provider chain.

use crate::adapters::{Consent, ConsentPrompt, NoPrompt, UploadProvider};
use crate::progress::{SyncPhase, SyncProgress};
use crate::{ProviderFailure, UploadError};
use permagit_types::{format_bytes, Estimate, SnapshotId, Tag};
use std::sync::Arc;

/// A successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    /// Provider that stored the blob.
    pub provider: String,
    /// Content address of the stored blob.
    pub blob_id: SnapshotId,
}

/// Tries providers in order until one stores the archive.
///
/// Each provider gets exactly one attempt per upload. When no provider
/// stores the archive for free, the operator is asked once before the first
/// attempt, unless the configured cost threshold covers the estimate.
pub struct UploadChain {
    providers: Vec<Arc<dyn UploadProvider>>,
    prompt: Arc<dyn ConsentPrompt>,
    threshold_cost: Option<f64>,
}

impl UploadChain {
    /// Create a chain over `providers`, tried in the given order.
    pub fn new(providers: Vec<Arc<dyn UploadProvider>>) -> Self {
        Self {
            providers,
            prompt: Arc::new(NoPrompt),
            threshold_cost: None,
        }
    }

    /// Set the prompt used to ask for consent.
    pub fn with_prompt(mut self, prompt: Arc<dyn ConsentPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Set the fiat amount below which uploads proceed without asking.
    pub fn with_threshold_cost(mut self, threshold: Option<f64>) -> Self {
        self.threshold_cost = threshold;
        self
    }

    /// Provider names in attempt order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Returns true if an upload of `size` bytes must be confirmed.
    pub fn needs_consent(&self, size: u64, estimate: Option<&Estimate>) -> bool {
        let paid = self.providers.iter().all(|p| size > p.free_tier_bytes());
        if !paid {
            return false;
        }
        let fiat = estimate.and_then(|e| e.cost_fiat);
        match (self.threshold_cost, fiat) {
            (Some(threshold), Some(cost)) => cost > threshold,
            _ => true,
        }
    }

    /// Upload `data` through the first provider that accepts it.
    pub async fn upload(
        &self,
        data: &[u8],
        tags: &[Tag],
        estimate: Option<&Estimate>,
        progress: &SyncProgress,
    ) -> Result<Uploaded, UploadError> {
        if self.providers.is_empty() {
            return Err(UploadError::NoProviders);
        }

        let size = data.len() as u64;
        if self.needs_consent(size, estimate) {
            let question = consent_question(size, estimate);
            if self.ask(question).await == Consent::Declined {
                tracing::info!("Upload cancelled by operator");
                return Err(UploadError::Cancelled);
            }
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            let name = provider.name().to_string();
            progress.message(SyncPhase::Uploading, &name);
            tracing::debug!(provider = %name, bytes = size, "Uploading archive");

            let error = match provider.upload_once(data, tags).await {
                Ok(id) => match SnapshotId::new(id) {
                    Ok(blob_id) => {
                        tracing::info!(provider = %name, blob = %blob_id, "Archive uploaded");
                        return Ok(Uploaded {
                            provider: name,
                            blob_id,
                        });
                    }
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            };

            tracing::warn!(provider = %name, error = %error, "Upload provider failed");
            progress.message(SyncPhase::ProviderFailed, format!("{name}: {error}"));
            failures.push(ProviderFailure {
                provider: name,
                error,
            });
        }

        Err(UploadError::Exhausted(failures))
    }

    async fn ask(&self, question: String) -> Consent {
        let prompt = Arc::clone(&self.prompt);
        match tokio::task::spawn_blocking(move || prompt.ask(&question)).await {
            Ok(consent) => consent,
            Err(e) => {
                tracing::warn!(error = %e, "Consent prompt failed");
                Consent::Declined
            }
        }
    }
}

fn consent_question(size: u64, estimate: Option<&Estimate>) -> String {
    match estimate {
        Some(Estimate {
            human_size,
            cost_native,
            cost_fiat: Some(fiat),
        }) => format!(
            "Uploading {human_size} costs ~{cost_native:.6} AR (${fiat:.4}). Continue? [y/N] "
        ),
        Some(e) => format!(
            "Uploading {} costs ~{:.6} AR (fiat price unknown). Continue? [y/N] ",
            e.human_size, e.cost_native
        ),
        None => format!(
            "Uploading {} is not free and no estimate is available. Continue? [y/N] ",
            format_bytes(size)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedPrompt, StubProvider};
    use pretty_assertions::assert_eq;

    fn estimate(fiat: f64) -> Estimate {
        Estimate {
            human_size: "1 KB".to_string(),
            cost_native: 0.01,
            cost_fiat: Some(fiat),
        }
    }

    fn chain(providers: &[Arc<StubProvider>]) -> UploadChain {
        UploadChain::new(
            providers
                .iter()
                .map(|p| Arc::clone(p) as Arc<dyn UploadProvider>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let first = Arc::new(StubProvider::failing("bundler", "503"));
        let second = Arc::new(StubProvider::succeeding("gateway", "blob-1"));
        let third = Arc::new(StubProvider::succeeding("spare", "blob-2"));

        let uploaded = chain(&[first.clone(), second.clone(), third.clone()])
            .upload(b"data", &[], None, &SyncProgress::new())
            .await
            .unwrap();

        assert_eq!(uploaded.provider, "gateway");
        assert_eq!(uploaded.blob_id.as_str(), "blob-1");
        assert_eq!(first.attempts(), 1);
        assert_eq!(second.attempts(), 1);
        assert_eq!(third.attempts(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_reports_every_failure() {
        let first = Arc::new(StubProvider::failing("bundler", "503"));
        let second = Arc::new(StubProvider::failing("gateway", "no funds"));

        let err = chain(&[first.clone(), second.clone()])
            .upload(b"data", &[], None, &SyncProgress::new())
            .await
            .unwrap_err();

        let UploadError::Exhausted(failures) = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].provider, "bundler");
        assert_eq!(failures[1].error, "no funds");
        assert_eq!(first.attempts(), 1);
        assert_eq!(second.attempts(), 1);
    }

    #[tokio::test]
    async fn test_decline_cancels_before_upload() {
        let provider = Arc::new(StubProvider::succeeding("gateway", "blob-1"));
        let prompt = Arc::new(ScriptedPrompt::new(Consent::Declined));

        let err = chain(&[provider.clone()])
            .with_prompt(prompt.clone())
            .upload(b"data", &[], Some(&estimate(1.0)), &SyncProgress::new())
            .await
            .unwrap_err();

        assert_eq!(err, UploadError::Cancelled);
        assert_eq!(prompt.questions().len(), 1);
        assert_eq!(provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_free_tier_skips_prompt() {
        let provider = Arc::new(StubProvider::succeeding("bundler", "blob-1").with_free_tier(1024));
        let prompt = Arc::new(ScriptedPrompt::new(Consent::Declined));

        chain(&[provider])
            .with_prompt(prompt.clone())
            .upload(b"small", &[], Some(&estimate(1.0)), &SyncProgress::new())
            .await
            .unwrap();

        assert!(prompt.questions().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_skips_prompt() {
        let provider = Arc::new(StubProvider::succeeding("gateway", "blob-1"));
        let prompt = Arc::new(ScriptedPrompt::new(Consent::Declined));

        chain(&[provider])
            .with_prompt(prompt.clone())
            .with_threshold_cost(Some(0.5))
            .upload(b"data", &[], Some(&estimate(0.25)), &SyncProgress::new())
            .await
            .unwrap();

        assert!(prompt.questions().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_without_fiat_quote_still_asks() {
        let provider = Arc::new(StubProvider::succeeding("gateway", "blob-1"));
        let prompt = Arc::new(ScriptedPrompt::new(Consent::Declined));
        let unquoted = Estimate {
            human_size: "1 KB".to_string(),
            cost_native: 50.0,
            cost_fiat: None,
        };

        let err = chain(&[provider.clone()])
            .with_prompt(prompt.clone())
            .with_threshold_cost(Some(1.0))
            .upload(b"data", &[], Some(&unquoted), &SyncProgress::new())
            .await
            .unwrap_err();

        assert_eq!(err, UploadError::Cancelled);
        assert_eq!(
            prompt.questions(),
            ["Uploading 1 KB costs ~50.000000 AR (fiat price unknown). Continue? [y/N] "]
        );
        assert_eq!(provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_no_terminal_proceeds() {
        let provider = Arc::new(StubProvider::succeeding("gateway", "blob-1"));

        let uploaded = chain(&[provider.clone()])
            .upload(b"data", &[], Some(&estimate(3.0)), &SyncProgress::new())
            .await
            .unwrap();

        assert_eq!(uploaded.provider, "gateway");
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test]
    async fn test_invalid_blob_id_counts_as_failure() {
        let broken = Arc::new(StubProvider::succeeding("broken", ""));
        let good = Arc::new(StubProvider::succeeding("gateway", "blob-1"));

        let uploaded = chain(&[broken, good])
            .upload(b"data", &[], None, &SyncProgress::new())
            .await
            .unwrap();

        assert_eq!(uploaded.provider, "gateway");
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let err = UploadChain::new(Vec::new())
            .upload(b"data", &[], None, &SyncProgress::new())
            .await
            .unwrap_err();
        assert_eq!(err, UploadError::NoProviders);
    }
}
