//! GitHub Actions mirror trigger.

use crate::http::{self, DEFAULT_TIMEOUT};
use crate::{ClientError, PrivateRepoCipher, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use permagit_sync::PushHook;
use permagit_types::{GithubSync, RepositoryDescriptor};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;

/// Public GitHub REST API.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    inputs: DispatchInputs<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchInputs<'a> {
    repo_id: &'a str,
}

/// Dispatches a repository's mirror workflow after each published push.
///
/// The access token is stored encrypted in the descriptor and unlocked with
/// the pushing wallet. Failures are logged and never reach the push.
pub struct GithubSyncTrigger {
    client: Client,
    api_base: String,
    cipher: Arc<PrivateRepoCipher>,
    address: String,
}

impl GithubSyncTrigger {
    /// Create a trigger acting for the wallet at `address`.
    pub fn new(cipher: Arc<PrivateRepoCipher>, address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            api_base: GITHUB_API_URL.to_string(),
            cipher,
            address: address.into(),
        })
    }

    /// Use another API endpoint.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn access_token(&self, sync: &GithubSync) -> Result<String> {
        let sealed = URL_SAFE_NO_PAD
            .decode(sync.access_token.trim_end_matches('='))
            .map_err(|e| ClientError::Crypto(format!("invalid access token: {e}")))?;
        let token = self.cipher.open(&sync.private_state_id, &sealed).await?;
        String::from_utf8(token)
            .map_err(|_| ClientError::Crypto("access token is not UTF-8".to_string()))
    }

    async fn dispatch(&self, repo: &RepositoryDescriptor, sync: &GithubSync) -> Result<StatusCode> {
        let token = self.access_token(sync).await?;
        if token.is_empty() {
            return Err(ClientError::Crypto("access token is empty".to_string()));
        }

        let url = http::join(
            &self.api_base,
            &format!(
                "repos/{}/actions/workflows/{}/dispatches",
                sync.repository, sync.workflow_id
            ),
        );
        let body = DispatchBody {
            git_ref: &sync.branch,
            inputs: DispatchInputs { repo_id: &repo.id },
        };
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        Ok(response.status())
    }
}

impl std::fmt::Debug for GithubSyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSyncTrigger")
            .field("api_base", &self.api_base)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PushHook for GithubSyncTrigger {
    async fn after_publish(&self, repo: &RepositoryDescriptor) {
        let Some(sync) = repo.github_sync.as_ref() else {
            return;
        };
        if !sync.is_triggered_by(&self.address) {
            return;
        }

        match self.dispatch(repo, sync).await {
            Ok(StatusCode::NO_CONTENT) => {
                tracing::info!(mirror = %sync.repository, "Triggered GitHub sync");
            }
            Ok(status) => tracing::debug!(%status, "GitHub sync dispatch rejected"),
            Err(e) => tracing::debug!(error = %e, "GitHub sync dispatch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::private::fixtures::{credential, sealed, state, IV};
    use crate::private::member_address;
    use permagit_types::SnapshotId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DISPATCH_PATH: &str = "/repos/alice/mirror/actions/workflows/sync.yml/dispatches";

    fn address() -> String {
        credential().address().to_string()
    }

    fn repo(allowed: Vec<String>) -> RepositoryDescriptor {
        RepositoryDescriptor {
            id: "6ace6247-d267-463d-b5bd-7e50d98c3693".to_string(),
            name: "hello".to_string(),
            description: String::new(),
            owner: "owner-addr".to_string(),
            contributors: Vec::new(),
            snapshot_id: SnapshotId::new("snap2").unwrap(),
            fork_of: None,
            private: false,
            private_state_id: None,
            github_sync: Some(GithubSync {
                enabled: true,
                repository: "alice/mirror".to_string(),
                branch: "main".to_string(),
                workflow_id: "sync.yml".to_string(),
                access_token: URL_SAFE_NO_PAD.encode(sealed(b"ghp_secret")),
                private_state_id: "state1".to_string(),
                allowed,
            }),
        }
    }

    async fn trigger(server: &MockServer) -> GithubSyncTrigger {
        Mock::given(method("GET"))
            .and(path("/state1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(state(&IV)))
            .mount(server)
            .await;
        let cipher = Arc::new(PrivateRepoCipher::new(server.uri(), credential()).unwrap());
        GithubSyncTrigger::new(cipher, address())
            .unwrap()
            .with_api_base(server.uri())
    }

    #[tokio::test]
    async fn test_dispatches_workflow_for_allowed_pusher() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DISPATCH_PATH))
            .and(header("authorization", "Bearer ghp_secret"))
            .and(header("x-github-api-version", API_VERSION))
            .and(body_json(serde_json::json!({
                "ref": "main",
                "inputs": { "repoId": "6ace6247-d267-463d-b5bd-7e50d98c3693" }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        trigger(&server).await.after_publish(&repo(vec![address()])).await;
    }

    #[tokio::test]
    async fn test_skips_pushers_not_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let not_allowed = member_address(credential().jwk()).unwrap();
        trigger(&server).await.after_publish(&repo(vec![not_allowed])).await;
    }

    #[tokio::test]
    async fn test_rejected_dispatch_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DISPATCH_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        trigger(&server).await.after_publish(&repo(vec![address()])).await;
    }

    #[tokio::test]
    async fn test_undecryptable_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut repo = repo(vec![address()]);
        if let Some(sync) = repo.github_sync.as_mut() {
            sync.access_token = "bm90LXNlYWxlZA".to_string();
        }
        trigger(&server).await.after_publish(&repo).await;
    }
}
