//! HTTP upload providers.

use crate::http::{self, ADDRESS_HEADER};
use crate::{ClientError, Credential, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use permagit_sync::{BoxError, UploadProvider};
use permagit_types::Tag;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the upload's tags as base64url-encoded JSON.
pub const TAGS_HEADER: &str = "x-permagit-tags";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

/// Posts archives to `POST {endpoint}/tx`.
pub struct HttpUploadProvider {
    name: String,
    endpoint: String,
    free_tier_bytes: u64,
    credential: Option<Arc<Credential>>,
    client: Client,
}

impl HttpUploadProvider {
    /// Create a provider named `name` posting to `endpoint`.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        credential: Option<Arc<Credential>>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            free_tier_bytes: 0,
            credential,
            client: http::build_client(UPLOAD_TIMEOUT)?,
        })
    }

    /// Set the size below which this provider stores archives for free.
    pub fn with_free_tier(mut self, bytes: u64) -> Self {
        self.free_tier_bytes = bytes;
        self
    }

    async fn post(&self, data: &[u8], tags: &[Tag]) -> Result<String> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            ClientError::Credential(format!("[{}] no wallet keyfile configured", self.name))
        })?;

        let url = http::join(&self.endpoint, "tx");
        let encoded_tags = URL_SAFE_NO_PAD.encode(serde_json::to_vec(tags)?);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(ADDRESS_HEADER, credential.address())
            .header(TAGS_HEADER, encoded_tags)
            .body(data.to_vec())
            .send()
            .await?;

        let body: UploadResponse = http::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.id)
    }
}

#[async_trait]
impl UploadProvider for HttpUploadProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn free_tier_bytes(&self) -> u64 {
        self.free_tier_bytes
    }

    async fn upload_once(&self, data: &[u8], tags: &[Tag]) -> std::result::Result<String, BoxError> {
        Ok(self.post(data, tags).await?)
    }
}
