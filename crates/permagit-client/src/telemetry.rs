//! Best-effort usage analytics.

use crate::http;
use crate::Result;
use async_trait::async_trait;
use permagit_sync::{Telemetry, TelemetryEvent};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
    event: &'static str,
    repository_id: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
}

/// Posts events as JSON to a collector. Never fails.
pub struct HttpTelemetry {
    client: Client,
    url: String,
    address: Option<String>,
}

impl HttpTelemetry {
    /// Create a sink posting to `url`, tagging events with `address`.
    pub fn new(url: impl Into<String>, address: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(TELEMETRY_TIMEOUT)?,
            url: url.into(),
            address,
        })
    }
}

#[async_trait]
impl Telemetry for HttpTelemetry {
    async fn record(&self, event: TelemetryEvent) {
        let (name, repository_id, success) = match &event {
            TelemetryEvent::Fetched {
                repository_id,
                success,
            } => ("clone", repository_id, *success),
            TelemetryEvent::Pushed {
                repository_id,
                success,
            } => ("push", repository_id, *success),
        };
        let body = EventBody {
            event: name,
            repository_id,
            success,
            address: self.address.as_deref(),
        };

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::debug!(status = %response.status(), "Telemetry rejected");
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Telemetry failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "event": "push",
                "repositoryId": "repo-1",
                "success": true,
                "address": "addr"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpTelemetry::new(server.uri(), Some("addr".to_string())).unwrap();
        sink.record(TelemetryEvent::Pushed {
            repository_id: "repo-1".to_string(),
            success: true,
        })
        .await;
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_ignored() {
        let sink = HttpTelemetry::new("http://127.0.0.1:9/events", None).unwrap();
        sink.record(TelemetryEvent::Fetched {
            repository_id: "repo-1".to_string(),
            success: false,
        })
        .await;
    }
}
