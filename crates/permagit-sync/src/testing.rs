//! In-memory fakes for the adapter traits.

use crate::adapters::{
    BlobDownloader, Consent, ConsentPrompt, MetadataClient, PricingClient, PublishAck, PushHook,
    RepoCipher, Telemetry, TelemetryEvent, UploadProvider, Vcs,
};
use crate::BoxError;
use async_trait::async_trait;
use parking_lot::Mutex;
use permagit_types::{Estimate, RepoRef, RepositoryDescriptor, SnapshotId, Tag};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ledger fake holding descriptors in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    repos: Mutex<Vec<RepositoryDescriptor>>,
    published: Mutex<Vec<(String, SnapshotId)>>,
    resolve_error: Mutex<Option<String>>,
    ack_override: Mutex<Option<String>>,
    publish_error: Mutex<Option<String>>,
}

impl InMemoryMetadata {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository.
    pub fn with_repo(self, repo: RepositoryDescriptor) -> Self {
        self.repos.lock().push(repo);
        self
    }

    /// Fail every lookup with `message`.
    pub fn fail_resolve(&self, message: &str) {
        *self.resolve_error.lock() = Some(message.to_string());
    }

    /// Acknowledge every publication with `id` instead of the requested one.
    pub fn ack_as(&self, id: &str) {
        *self.ack_override.lock() = Some(id.to_string());
    }

    /// Fail every publication with `message`.
    pub fn fail_publish(&self, message: &str) {
        *self.publish_error.lock() = Some(message.to_string());
    }

    /// Publications received, in order.
    pub fn published(&self) -> Vec<(String, SnapshotId)> {
        self.published.lock().clone()
    }

    /// Current descriptor for `id`.
    pub fn get(&self, id: &str) -> Option<RepositoryDescriptor> {
        self.repos.lock().iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadata {
    async fn resolve(&self, repo: &RepoRef) -> Result<Option<RepositoryDescriptor>, BoxError> {
        if let Some(message) = self.resolve_error.lock().clone() {
            return Err(message.into());
        }
        let repos = self.repos.lock();
        let found = repos.iter().find(|r| match repo {
            RepoRef::Id(id) => &r.id == id,
            RepoRef::OwnerName { owner, name } => &r.owner == owner && &r.name == name,
        });
        Ok(found.cloned())
    }

    async fn publish(
        &self,
        repository_id: &str,
        snapshot: &SnapshotId,
    ) -> Result<PublishAck, BoxError> {
        if let Some(message) = self.publish_error.lock().clone() {
            return Err(message.into());
        }
        self.published
            .lock()
            .push((repository_id.to_string(), snapshot.clone()));
        if let Some(repo) = self.repos.lock().iter_mut().find(|r| r.id == repository_id) {
            repo.snapshot_id = snapshot.clone();
        }
        let accepted_id = self
            .ack_override
            .lock()
            .clone()
            .unwrap_or_else(|| repository_id.to_string());
        Ok(PublishAck { accepted_id })
    }
}

/// Blob store fake that counts downloads.
#[derive(Debug, Default)]
pub struct InMemoryBlobs {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl InMemoryBlobs {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `id`.
    pub fn insert(&self, id: &str, data: Vec<u8>) {
        self.blobs.lock().insert(id.to_string(), data);
    }

    /// Number of download calls made.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobDownloader for InMemoryBlobs {
    async fn download(&self, id: &SnapshotId) -> Result<Option<Vec<u8>>, BoxError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.blobs.lock().get(id.as_str()).cloned())
    }
}

/// Upload provider with a fixed result.
#[derive(Debug)]
pub struct StubProvider {
    name: String,
    free_tier: u64,
    result: Result<String, String>,
    attempts: AtomicUsize,
    tags: Mutex<Vec<Tag>>,
    uploads: Mutex<Vec<Vec<u8>>>,
}

impl StubProvider {
    /// A provider that stores every blob under `blob_id`.
    pub fn succeeding(name: &str, blob_id: &str) -> Self {
        Self::with_result(name, Ok(blob_id.to_string()))
    }

    /// A provider that fails every attempt with `error`.
    pub fn failing(name: &str, error: &str) -> Self {
        Self::with_result(name, Err(error.to_string()))
    }

    fn with_result(name: &str, result: Result<String, String>) -> Self {
        Self {
            name: name.to_string(),
            free_tier: 0,
            result,
            attempts: AtomicUsize::new(0),
            tags: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Set the free tier size.
    pub fn with_free_tier(mut self, bytes: u64) -> Self {
        self.free_tier = bytes;
        self
    }

    /// Number of upload attempts.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Tags of the last attempt.
    pub fn last_tags(&self) -> Vec<Tag> {
        self.tags.lock().clone()
    }

    /// Payload of the last attempt.
    pub fn last_upload(&self) -> Option<Vec<u8>> {
        self.uploads.lock().last().cloned()
    }
}

#[async_trait]
impl UploadProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn free_tier_bytes(&self) -> u64 {
        self.free_tier
    }

    async fn upload_once(&self, data: &[u8], tags: &[Tag]) -> Result<String, BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.tags.lock() = tags.to_vec();
        self.uploads.lock().push(data.to_vec());
        self.result.clone().map_err(Into::into)
    }
}

/// Prompt returning a fixed answer and recording questions.
#[derive(Debug)]
pub struct ScriptedPrompt {
    answer: Consent,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// Create a prompt that always answers `answer`.
    pub fn new(answer: Consent) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }
}

impl ConsentPrompt for ScriptedPrompt {
    fn ask(&self, question: &str) -> Consent {
        self.questions.lock().push(question.to_string());
        self.answer
    }
}

/// Pricing fake with a fixed fiat cost.
#[derive(Debug, Clone, Copy)]
pub struct FixedPricing {
    /// Fiat cost returned for every size.
    pub cost_fiat: f64,
}

#[async_trait]
impl PricingClient for FixedPricing {
    async fn estimate(&self, bytes: u64) -> Result<Estimate, BoxError> {
        Ok(Estimate {
            human_size: permagit_types::format_bytes(bytes),
            cost_native: self.cost_fiat / 10.0,
            cost_fiat: Some(self.cost_fiat),
        })
    }
}

/// Version control fake whose bare clone is a recursive copy.
#[derive(Debug, Default)]
pub struct CopyVcs {
    sources: Mutex<Vec<PathBuf>>,
    remotes: Mutex<Vec<(PathBuf, String, String)>>,
    fail: Mutex<Option<String>>,
}

impl CopyVcs {
    /// Create the fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every clone with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.fail.lock() = Some(message.to_string());
    }

    /// Source directories cloned so far.
    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources.lock().clone()
    }

    /// Remote URL updates so far.
    pub fn remote_updates(&self) -> Vec<(PathBuf, String, String)> {
        self.remotes.lock().clone()
    }
}

#[async_trait]
impl Vcs for CopyVcs {
    async fn bare_clone(&self, source: &Path, dest: &Path) -> Result<(), BoxError> {
        self.sources.lock().push(source.to_path_buf());
        if let Some(message) = self.fail.lock().clone() {
            std::fs::create_dir_all(dest)?;
            return Err(message.into());
        }
        copy_dir(source, dest)?;
        Ok(())
    }

    async fn set_remote_url(
        &self,
        repo_dir: &Path,
        remote: &str,
        url: &str,
    ) -> Result<(), BoxError> {
        self.remotes
            .lock()
            .push((repo_dir.to_path_buf(), remote.to_string(), url.to_string()));
        Ok(())
    }
}

fn copy_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// Telemetry sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    /// Events recorded so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Telemetry for RecordingTelemetry {
    async fn record(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

/// Cipher fake that XORs every byte with a fixed key.
#[derive(Debug)]
pub struct XorCipher {
    key: u8,
    fail: Mutex<Option<String>>,
}

impl XorCipher {
    /// Create a cipher with the given key byte.
    pub fn new(key: u8) -> Self {
        Self {
            key,
            fail: Mutex::new(None),
        }
    }

    /// Fail every operation with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.fail.lock() = Some(message.to_string());
    }

    /// Applies the cipher to `data`. Encryption and decryption are the same.
    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ self.key).collect()
    }

    fn run(&self, data: Vec<u8>) -> Result<Vec<u8>, BoxError> {
        if let Some(message) = self.fail.lock().clone() {
            return Err(message.into());
        }
        Ok(self.apply(&data))
    }
}

#[async_trait]
impl RepoCipher for XorCipher {
    async fn decrypt(
        &self,
        _repo: &RepositoryDescriptor,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, BoxError> {
        self.run(data)
    }

    async fn encrypt(
        &self,
        _repo: &RepositoryDescriptor,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, BoxError> {
        self.run(data)
    }
}

/// Push hook that records the repositories it ran for.
#[derive(Debug, Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<String>>,
}

impl RecordingHook {
    /// Repository ids seen so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PushHook for RecordingHook {
    async fn after_publish(&self, repo: &RepositoryDescriptor) {
        self.calls.lock().push(repo.id.clone());
    }
}
