//! Ledger metadata client.

use crate::http::{self, ADDRESS_HEADER, DEFAULT_TIMEOUT};
use crate::{ClientError, Credential, Result};
use async_trait::async_trait;
use permagit_sync::{BoxError, MetadataClient, PublishAck};
use permagit_types::{RepoRef, RepositoryDescriptor, SnapshotId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    snapshot_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
}

/// Reads and updates repository descriptors over HTTP.
pub struct LedgerClient {
    client: Client,
    base_url: String,
    credential: Option<Arc<Credential>>,
}

impl LedgerClient {
    /// Create a client for the ledger at `base_url`.
    pub fn new(base_url: impl Into<String>, credential: Option<Arc<Credential>>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into(),
            credential,
        })
    }

    /// Fetch a descriptor; `None` if the ledger does not know it.
    pub async fn get(&self, repo: &RepoRef) -> Result<Option<RepositoryDescriptor>> {
        let path = match repo {
            RepoRef::Id(id) => format!("repositories/{id}"),
            RepoRef::OwnerName { owner, name } => format!("repositories/by-name/{owner}/{name}"),
        };
        let url = http::join(&self.base_url, &path);
        tracing::debug!(url = %url, "Resolving repository");

        let response = self.client.get(&url).send().await?;
        let Some(response) = http::check_found(response).await? else {
            return Ok(None);
        };
        let descriptor = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(Some(descriptor))
    }

    /// Record `snapshot` as the latest snapshot of `repository_id`.
    pub async fn update_snapshot(&self, repository_id: &str, snapshot: &SnapshotId) -> Result<String> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| ClientError::Credential("no wallet keyfile configured".to_string()))?;

        let url = http::join(&self.base_url, &format!("repositories/{repository_id}/snapshot"));
        let response = self
            .client
            .post(&url)
            .header(ADDRESS_HEADER, credential.address())
            .json(&PublishRequest {
                snapshot_id: snapshot.as_str(),
            })
            .send()
            .await?;

        let body: PublishResponse = http::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.id)
    }
}

#[async_trait]
impl MetadataClient for LedgerClient {
    async fn resolve(&self, repo: &RepoRef) -> std::result::Result<Option<RepositoryDescriptor>, BoxError> {
        Ok(self.get(repo).await?)
    }

    async fn publish(
        &self,
        repository_id: &str,
        snapshot: &SnapshotId,
    ) -> std::result::Result<PublishAck, BoxError> {
        let accepted_id = self.update_snapshot(repository_id, snapshot).await?;
        Ok(PublishAck { accepted_id })
    }
}
