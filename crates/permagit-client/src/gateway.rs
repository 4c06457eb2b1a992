//! Blob gateway: downloads and storage pricing.

use crate::http::{self, DEFAULT_TIMEOUT};
use crate::{ClientError, Result};
use async_trait::async_trait;
use permagit_sync::{BlobDownloader, BoxError, PricingClient};
use permagit_types::{format_bytes, Estimate, SnapshotId};
use reqwest::Client;
use std::time::Duration;

/// Base units per native unit of the storage network.
pub const WINSTON_PER_AR: f64 = 1e12;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads blobs from `GET {base}/{id}`.
pub struct GatewayDownloader {
    client: Client,
    base_url: String,
}

impl GatewayDownloader {
    /// Create a downloader for the gateway at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(DOWNLOAD_TIMEOUT)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BlobDownloader for GatewayDownloader {
    async fn download(&self, id: &SnapshotId) -> std::result::Result<Option<Vec<u8>>, BoxError> {
        let url = http::join(&self.base_url, id.as_str());
        tracing::debug!(url = %url, "Downloading blob");

        let response = self.client.get(&url).send().await.map_err(ClientError::from)?;
        let Some(response) = http::check_found(response).await? else {
            return Ok(None);
        };
        let bytes = response.bytes().await.map_err(ClientError::from)?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Prices uploads with the gateway's `GET /price/<bytes>` endpoint.
///
/// The fiat quote is optional: when it cannot be fetched the estimate
/// carries no fiat cost.
pub struct GatewayPricing {
    client: Client,
    base_url: String,
    fiat_price_url: Option<String>,
}

impl GatewayPricing {
    /// Create a pricing client. `fiat_price_url` must answer with
    /// `{"arweave": {"usd": <price>}}`.
    pub fn new(base_url: impl Into<String>, fiat_price_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into(),
            fiat_price_url,
        })
    }

    async fn winston_for(&self, bytes: u64) -> Result<f64> {
        let url = http::join(&self.base_url, &format!("price/{bytes}"));
        let text = http::check(self.client.get(&url).send().await?)
            .await?
            .text()
            .await?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| ClientError::InvalidResponse(format!("not a price: {text:?}")))
    }

    async fn fiat_rate(&self) -> Option<f64> {
        let url = self.fiat_price_url.as_ref()?;
        let fetched: Result<serde_json::Value> = async {
            let response = http::check(self.client.get(url).send().await?).await?;
            Ok(response.json().await?)
        }
        .await;
        match fetched {
            Ok(value) => value.pointer("/arweave/usd").and_then(|v| v.as_f64()),
            Err(e) => {
                tracing::debug!(error = %e, "Fiat quote unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl PricingClient for GatewayPricing {
    async fn estimate(&self, bytes: u64) -> std::result::Result<Estimate, BoxError> {
        let cost_native = self.winston_for(bytes).await? / WINSTON_PER_AR;
        let cost_fiat = self.fiat_rate().await.map(|rate| rate * cost_native);
        Ok(Estimate {
            human_size: format_bytes(bytes),
            cost_native,
            cost_fiat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snap1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let downloader = GatewayDownloader::new(server.uri()).unwrap();
        let data = downloader
            .download(&SnapshotId::new("snap1").unwrap())
            .await
            .unwrap();
        assert_eq!(data.as_deref(), Some(&b"PK\x03\x04"[..]));
    }

    #[tokio::test]
    async fn test_download_missing_blob() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let downloader = GatewayDownloader::new(server.uri()).unwrap();
        let data = downloader
            .download(&SnapshotId::new("gone").unwrap())
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_estimate_with_fiat_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/2048"))
            .respond_with(ResponseTemplate::new(200).set_body_string("500000000000"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fiat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "arweave": { "usd": 8.0 } })),
            )
            .mount(&server)
            .await;

        let pricing = GatewayPricing::new(server.uri(), Some(format!("{}/fiat", server.uri())))
            .unwrap();
        let estimate = pricing.estimate(2048).await.unwrap();

        assert_eq!(estimate.human_size, "2 KB");
        assert_eq!(estimate.cost_native, 0.5);
        assert_eq!(estimate.cost_fiat, Some(4.0));
    }

    #[tokio::test]
    async fn test_estimate_without_fiat_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/10"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1000000000000"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fiat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let pricing = GatewayPricing::new(server.uri(), Some(format!("{}/fiat", server.uri())))
            .unwrap();
        let estimate = pricing.estimate(10).await.unwrap();

        assert_eq!(estimate.cost_native, 1.0);
        assert_eq!(estimate.cost_fiat, None);
        assert_eq!(estimate.fiat_or_zero(), 0.0);
    }
}
