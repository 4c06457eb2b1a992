//! Wiring between git, the bridge and the sync flows.

use crate::bridge::{Bridge, BridgeOutcome, ConnectPolicy, Service};
use crate::config::{Config, ConfigError};
use crate::prompt::TtyPrompt;
use crate::ui;
use permagit_cache::CacheStore;
use permagit_client::{
    ClientError, Credential, GatewayDownloader, GatewayPricing, GithubSyncTrigger, HttpTelemetry,
    HttpUploadProvider, LedgerClient, PrivateRepoCipher,
};
use permagit_sync::{
    GitCli, NoTelemetry, ProgressUpdate, PushOutcome, SyncError, SyncOrchestrator, SyncProgress, Telemetry,
    TelemetryEvent, UploadChain, UploadProvider, Vcs,
};
use permagit_types::{RepoRef, RepositoryDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Scratch directory created inside `$GIT_DIR`.
pub const WORKING_DIR_NAME: &str = ".permagit";

/// URL scheme used when pinning remotes to stable ids.
pub const DEFAULT_SCHEME: &str = "permagit";

/// Errors raised while assembling the helper from its environment.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An HTTP collaborator could not be built.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// The remote git asked the helper to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    /// Remote name, or the URL itself for anonymous remotes.
    pub name: String,
    /// Remote URL.
    pub url: String,
}

impl Remote {
    /// Builds a remote from helper arguments; a missing URL means the name is the URL.
    pub fn new(name: String, url: Option<String>) -> Self {
        let url = url.unwrap_or_else(|| name.clone());
        Self { name, url }
    }

    /// Returns true if git config holds an entry for this remote.
    pub fn is_named(&self) -> bool {
        self.name != self.url && !self.name.contains("://")
    }

    fn scheme(&self) -> &str {
        self.url
            .split_once("://")
            .map_or(DEFAULT_SCHEME, |(scheme, _)| scheme)
    }
}

/// Refuses pushes from anyone but the owner and contributors.
pub struct WriteGate<'a> {
    descriptor: &'a RepositoryDescriptor,
    address: Option<&'a str>,
}

impl<'a> WriteGate<'a> {
    /// Create a gate for `descriptor` and the configured wallet address.
    pub fn new(descriptor: &'a RepositoryDescriptor, address: Option<&'a str>) -> Self {
        Self {
            descriptor,
            address,
        }
    }
}

impl ConnectPolicy for WriteGate<'_> {
    fn authorize(&self, service: &Service) -> bool {
        let allowed = self.address.map(|a| self.descriptor.can_write(a));
        match (service, allowed) {
            (Service::ReceivePack, None) => {
                ui::error("No wallet keyfile configured; pushing requires one.");
                ui::error("Set it with: git config --add permagit.keyfile <path-to-wallet.json>");
                false
            }
            (Service::ReceivePack, Some(false)) => {
                ui::error(format!(
                    "You are not the owner or a contributor of '{}'; push refused.",
                    self.descriptor.name
                ));
                false
            }
            (_, None) => {
                ui::success("Tip: set permagit.keyfile in git config to push to this repository.");
                true
            }
            (_, Some(false)) => {
                ui::warn(format!(
                    "You are not a contributor of '{}'; you will not be able to push.",
                    self.descriptor.name
                ));
                true
            }
            (_, Some(true)) => true,
        }
    }
}

/// A fully wired helper for one git directory.
pub struct App {
    git_dir: PathBuf,
    orchestrator: SyncOrchestrator,
    vcs: Arc<dyn Vcs>,
    telemetry: Arc<dyn Telemetry>,
    address: Option<String>,
}

impl App {
    /// Assemble an app from explicit parts.
    pub fn new(
        git_dir: impl Into<PathBuf>,
        orchestrator: SyncOrchestrator,
        vcs: Arc<dyn Vcs>,
        telemetry: Arc<dyn Telemetry>,
        address: Option<String>,
    ) -> Self {
        Self {
            git_dir: git_dir.into(),
            orchestrator,
            vcs,
            telemetry,
            address,
        }
    }

    /// Load configuration and build HTTP collaborators for `git_dir`.
    pub async fn from_environment(git_dir: PathBuf) -> Result<Self, SetupError> {
        let git = GitCli::default();
        let config = load_config(&git_dir, &git).await?;
        let credential = load_credential(&config);
        let address = credential.as_ref().map(|c| c.address().to_string());
        tracing::debug!(ledger = %config.ledger_url, address = ?address, "Configuration loaded");

        let ledger = LedgerClient::new(&config.ledger_url, credential.clone())?;
        let downloader = GatewayDownloader::new(&config.gateway_url)?;
        let pricing = GatewayPricing::new(&config.gateway_url, config.fiat_price_url.clone())?;
        let providers = config
            .providers
            .iter()
            .map(|p| {
                let provider = HttpUploadProvider::new(&p.name, &p.endpoint, credential.clone())?
                    .with_free_tier(p.free_tier_bytes);
                Ok(Arc::new(provider) as Arc<dyn UploadProvider>)
            })
            .collect::<Result<Vec<_>, ClientError>>()?;
        let chain = UploadChain::new(providers)
            .with_prompt(Arc::new(TtyPrompt::default()))
            .with_threshold_cost(config.threshold_cost);

        let telemetry: Arc<dyn Telemetry> = match &config.telemetry_url {
            Some(url) => Arc::new(HttpTelemetry::new(url, address.clone())?),
            None => Arc::new(NoTelemetry),
        };

        let vcs = Arc::new(git);
        let orchestrator = SyncOrchestrator::new(Arc::new(ledger), Arc::new(downloader), chain, vcs.clone())
            .with_pricing(Arc::new(pricing))
            .with_progress(SyncProgress::with_callback(Box::new(|update: ProgressUpdate| {
                ui::progress(&update)
            })))
            .with_creator(address.clone().unwrap_or_default());
        let orchestrator = match &credential {
            Some(credential) => {
                let cipher = Arc::new(PrivateRepoCipher::new(&config.gateway_url, credential.clone())?);
                let trigger = GithubSyncTrigger::new(cipher.clone(), credential.address())?;
                orchestrator.with_cipher(cipher).with_push_hook(Arc::new(trigger))
            }
            None => orchestrator,
        };

        Ok(Self::new(git_dir, orchestrator, vcs, telemetry, address))
    }

    /// Serves one helper session and returns the process exit status.
    pub async fn run<R, W, E>(&self, remote: &Remote, input: R, output: &mut W, errors: &mut E) -> i32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let repo = match RepoRef::from_url(&remote.url) {
            Ok(repo) => repo,
            Err(e) => {
                ui::error(e);
                return 1;
            }
        };

        let store = match CacheStore::ensure_working_directory(self.git_dir.join(WORKING_DIR_NAME)) {
            Ok(store) => store,
            Err(e) => {
                ui::error(e);
                return 1;
            }
        };

        let descriptor = match self.orchestrator.download_repo(&repo, &store).await {
            Ok(descriptor) => descriptor,
            Err(SyncError::RepositoryNotFound(id)) => {
                ui::error(format!("Repository '{id}' not found"));
                return 0;
            }
            Err(SyncError::Metadata(reason)) => {
                ui::error(format!("Repository '{repo}' could not be resolved: {reason}"));
                return 0;
            }
            Err(e) => {
                ui::error(&e);
                return e.exit_code();
            }
        };

        if !repo.is_stable() {
            self.pin_remote(remote, &descriptor).await;
        }

        let gate = WriteGate::new(&descriptor, self.address.as_deref());
        let bridge = Bridge::new(store.entry_path(&descriptor.snapshot_id), &gate);
        match bridge.run(input, output, errors).await {
            Ok(outcome) => self.finish(outcome, &descriptor, &store).await,
            Err(e) => {
                ui::error(e);
                1
            }
        }
    }

    /// Maps a finished bridge session to an exit status, pushing if needed.
    pub async fn finish(
        &self,
        outcome: BridgeOutcome,
        descriptor: &RepositoryDescriptor,
        store: &CacheStore,
    ) -> i32 {
        let BridgeOutcome::Connected {
            service,
            exit_code,
            objects_received,
        } = outcome
        else {
            return 0;
        };

        if exit_code != Some(0) {
            let shown = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
            ui::error(format!("git command '{service}' exited with error. Exit code: {shown}"));
            return exit_code.filter(|c| *c != 0).unwrap_or(1);
        }

        match service {
            Service::ReceivePack if objects_received => self.push(descriptor, store).await,
            Service::UploadPack => {
                self.telemetry
                    .record(TelemetryEvent::Fetched {
                        repository_id: descriptor.id.clone(),
                        success: true,
                    })
                    .await;
                0
            }
            _ => 0,
        }
    }

    async fn push(&self, descriptor: &RepositoryDescriptor, store: &CacheStore) -> i32 {
        ui::info("Push to temp remote finished successfully, now syncing with the ledger ...");
        let Some(source) = repository_root(&self.git_dir) else {
            ui::error(format!("Cannot locate the repository containing {}", self.git_dir.display()));
            return 1;
        };

        let outcome = self.orchestrator.upload_repo(source, descriptor, store).await;
        if !outcome.is_cancelled() {
            self.telemetry
                .record(TelemetryEvent::Pushed {
                    repository_id: descriptor.id.clone(),
                    success: outcome.is_published(),
                })
                .await;
        }

        match outcome {
            PushOutcome::Published { snapshot_id, provider } => {
                ui::success(format!(
                    "Successfully pushed repo '{}' (snapshot {snapshot_id} via {provider})",
                    descriptor.id
                ));
                0
            }
            PushOutcome::Cancelled => {
                ui::info("Push cancelled; the repository was not updated.");
                0
            }
            PushOutcome::Failed { reason } => {
                ui::error(format!("Failed to push repo '{}': {reason}", descriptor.id));
                ui::error("Please run `git pull` first to clean the cache and integrate your changes");
                1
            }
            PushOutcome::Unpublished { blob_id, reason } => {
                ui::error(format!(
                    "Uploaded snapshot {blob_id} but repo '{}' was not updated: {reason}",
                    descriptor.id
                ));
                ui::error("Please run `git pull` first to clean the cache and integrate your changes");
                1
            }
        }
    }

    /// Points a named `owner/name` remote at the stable repository id.
    async fn pin_remote(&self, remote: &Remote, descriptor: &RepositoryDescriptor) {
        if !remote.is_named() {
            return;
        }
        let url = format!("{}://{}", remote.scheme(), descriptor.id);
        match self.vcs.set_remote_url(&self.git_dir, &remote.name, &url).await {
            Ok(()) => ui::info(format!("Remote '{}' now points to {url}", remote.name)),
            Err(e) => tracing::debug!(remote = %remote.name, error = %e, "Failed to pin remote URL"),
        }
    }
}

/// Directory packed on push: the parent of `$GIT_DIR`.
fn repository_root(git_dir: &Path) -> Option<&Path> {
    git_dir.parent().filter(|p| !p.as_os_str().is_empty())
}

async fn load_config(git_dir: &Path, git: &GitCli) -> Result<Config, ConfigError> {
    let mut config = Config::from_file(Config::default_path().as_deref())?;
    let keyfile = git.config_get(git_dir, "permagit.keyfile").await;
    let threshold = git.config_get(git_dir, "permagit.thresholdCost").await;
    config.apply_git(keyfile, threshold)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

fn load_credential(config: &Config) -> Option<Arc<Credential>> {
    let path = config.keyfile.as_ref()?;
    match Credential::load(path) {
        Ok(credential) => Some(Arc::new(credential)),
        Err(e) => {
            ui::warn(format!("Ignoring wallet keyfile: {e}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permagit_sync::testing::{CopyVcs, InMemoryBlobs, InMemoryMetadata, RecordingTelemetry, StubProvider};
    use permagit_types::SnapshotId;
    use pretty_assertions::assert_eq;

    const REPO_ID: &str = "6ace6247-d267-463d-b5bd-7e50d98c3693";

    fn descriptor() -> RepositoryDescriptor {
        RepositoryDescriptor {
            id: REPO_ID.to_string(),
            name: "hello".to_string(),
            description: String::new(),
            owner: "owner-addr".to_string(),
            contributors: vec!["friend-addr".to_string()],
            snapshot_id: SnapshotId::new("snap1").unwrap(),
            fork_of: None,
            private: false,
            private_state_id: None,
            github_sync: None,
        }
    }

    #[test]
    fn test_remote_naming() {
        let anonymous = Remote::new("permagit://alice/hello".into(), None);
        assert!(!anonymous.is_named());

        let named = Remote::new("origin".into(), Some("permagit://alice/hello".into()));
        assert!(named.is_named());
        assert_eq!(named.scheme(), "permagit");
    }

    #[test]
    fn test_write_gate() {
        let repo = descriptor();
        assert!(!WriteGate::new(&repo, None).authorize(&Service::ReceivePack));
        assert!(!WriteGate::new(&repo, Some("stranger")).authorize(&Service::ReceivePack));
        assert!(WriteGate::new(&repo, Some("friend-addr")).authorize(&Service::ReceivePack));
        assert!(WriteGate::new(&repo, None).authorize(&Service::UploadPack));
        assert!(WriteGate::new(&repo, Some("stranger")).authorize(&Service::UploadPack));
    }

    #[test]
    fn test_repository_root() {
        assert_eq!(repository_root(Path::new("/work/repo/.git")), Some(Path::new("/work/repo")));
        assert_eq!(repository_root(Path::new(".git")), None);
    }

    struct Harness {
        dir: tempfile::TempDir,
        metadata: Arc<InMemoryMetadata>,
        vcs: Arc<CopyVcs>,
        telemetry: Arc<RecordingTelemetry>,
        provider: Arc<StubProvider>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                metadata: Arc::new(InMemoryMetadata::new().with_repo(descriptor())),
                vcs: Arc::new(CopyVcs::new()),
                telemetry: Arc::new(RecordingTelemetry::default()),
                provider: Arc::new(StubProvider::succeeding("gateway", "snap2")),
            }
        }

        fn git_dir(&self) -> PathBuf {
            self.dir.path().join(".git")
        }

        fn app(&self) -> App {
            let chain = UploadChain::new(vec![self.provider.clone() as Arc<dyn UploadProvider>]);
            let orchestrator = SyncOrchestrator::new(
                self.metadata.clone(),
                Arc::new(InMemoryBlobs::new()),
                chain,
                self.vcs.clone(),
            );
            App::new(
                self.git_dir(),
                orchestrator,
                self.vcs.clone(),
                self.telemetry.clone(),
                Some("owner-addr".to_string()),
            )
        }

        fn store(&self) -> CacheStore {
            std::fs::create_dir_all(self.git_dir()).unwrap();
            std::fs::write(self.dir.path().join("README.md"), "hello\n").unwrap();
            CacheStore::ensure_working_directory(self.git_dir().join(WORKING_DIR_NAME)).unwrap()
        }
    }

    fn connected(service: Service, exit_code: Option<i32>, objects_received: bool) -> BridgeOutcome {
        BridgeOutcome::Connected {
            service,
            exit_code,
            objects_received,
        }
    }

    #[tokio::test]
    async fn test_child_failure_exit_codes() {
        let h = Harness::new();
        let store = h.store();
        let app = h.app();

        let code = app
            .finish(connected(Service::UploadPack, Some(128), false), &descriptor(), &store)
            .await;
        assert_eq!(code, 128);

        let code = app
            .finish(connected(Service::ReceivePack, None, true), &descriptor(), &store)
            .await;
        assert_eq!(code, 1);
        assert!(h.metadata.published().is_empty());
    }

    #[tokio::test]
    async fn test_empty_push_does_not_upload() {
        let h = Harness::new();
        let store = h.store();

        let code = h
            .app()
            .finish(connected(Service::ReceivePack, Some(0), false), &descriptor(), &store)
            .await;

        assert_eq!(code, 0);
        assert_eq!(h.provider.attempts(), 0);
    }

    #[tokio::test]
    async fn test_push_after_receive_publishes() {
        let h = Harness::new();
        let store = h.store();

        let code = h
            .app()
            .finish(connected(Service::ReceivePack, Some(0), true), &descriptor(), &store)
            .await;

        assert_eq!(code, 0);
        assert_eq!(
            h.metadata.published(),
            [(REPO_ID.to_string(), SnapshotId::new("snap2").unwrap())]
        );
        assert_eq!(
            h.telemetry.events(),
            [TelemetryEvent::Pushed {
                repository_id: REPO_ID.to_string(),
                success: true
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_publish_exits_non_zero() {
        let h = Harness::new();
        let store = h.store();
        h.metadata.fail_publish("ledger unavailable");

        let code = h
            .app()
            .finish(connected(Service::ReceivePack, Some(0), true), &descriptor(), &store)
            .await;

        assert_eq!(code, 1);
        assert!(store.is_dirty(&SnapshotId::new("snap1").unwrap()));
    }

    #[tokio::test]
    async fn test_unknown_repository_exits_cleanly() {
        let h = Harness::new();
        std::fs::create_dir_all(h.git_dir()).unwrap();
        let remote = Remote::new(
            "origin".into(),
            Some("permagit://0b5a4c1e-8f43-4a4e-9d0e-6c1a57a3a111".into()),
        );
        let mut output = Vec::new();
        let mut errors = Vec::new();

        let code = h.app().run(&remote, &b"capabilities\n"[..], &mut output, &mut errors).await;

        assert_eq!(code, 0);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_exits_cleanly() {
        let h = Harness::new();
        std::fs::create_dir_all(h.git_dir()).unwrap();
        h.metadata.fail_resolve("ledger unreachable");
        let remote = Remote::new("origin".into(), Some(format!("permagit://{REPO_ID}")));
        let mut output = Vec::new();
        let mut errors = Vec::new();

        let code = h.app().run(&remote, &b"capabilities\n"[..], &mut output, &mut errors).await;

        assert_eq!(code, 0);
        assert!(output.is_empty());
        assert!(h.vcs.sources().is_empty());
    }

    #[tokio::test]
    async fn test_owner_name_remote_is_pinned() {
        let h = Harness::new();
        let store = h.store();
        std::fs::create_dir(store.entry_path(&SnapshotId::new("snap1").unwrap())).unwrap();
        let remote = Remote::new("origin".into(), Some("permagit://owner-addr/hello".into()));
        let mut output = Vec::new();
        let mut errors = Vec::new();

        let code = h.app().run(&remote, &b"capabilities\n\n"[..], &mut output, &mut errors).await;

        assert_eq!(code, 0);
        assert_eq!(output, b"connect\n\n");
        assert_eq!(
            h.vcs.remote_updates(),
            [(h.git_dir(), "origin".to_string(), format!("permagit://{REPO_ID}"))]
        );
    }
}
