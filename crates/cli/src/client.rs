//! HTTP client for the stream processing stats API

use advisor_lib::{ProcessorStats, SampleError, StatsSource, Tier};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const ACCEPT_VERSION: &str = "application/vnd.atlas.2024-05-30+json";

/// Processor document returned by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDocument {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub stats: Option<ProcessorStats>,
}

/// Client bound to one project and stream processing workspace
pub struct AtlasClient {
    client: Client,
    base_url: Url,
    project_id: String,
    workspace: String,
    token: Option<String>,
    timeout: Duration,
}

impl AtlasClient {
    pub fn new(
        base_url: &str,
        project_id: impl Into<String>,
        workspace: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self {
            client,
            base_url,
            project_id: project_id.into(),
            workspace: workspace.into(),
            token,
            timeout,
        })
    }

    fn processor_url(&self, processor: &str) -> Result<Url, SampleError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SampleError::Transport(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend([
                "api",
                "atlas",
                "v2",
                "groups",
                self.project_id.as_str(),
                "streams",
                self.workspace.as_str(),
                "processor",
                processor,
            ]);
        url.query_pairs_mut().append_pair("options.verbose", "true");
        Ok(url)
    }

    /// Fetch a processor document
    pub async fn get_processor(&self, processor: &str) -> Result<ProcessorDocument, SampleError> {
        let url = self.processor_url(processor)?;
        debug!(url = %url, "Fetching processor");

        let mut request = self.client.get(url).header(header::ACCEPT, ACCEPT_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SampleError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                SampleError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SampleError::NotFound(processor.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SampleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SampleError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatsSource for AtlasClient {
    async fn get_stats(&self, processor: &str) -> Result<ProcessorStats, SampleError> {
        let document = self.get_processor(processor).await?;
        let mut stats = document.stats.ok_or_else(|| {
            SampleError::Decode(format!(
                "processor '{}' reported no stats (state: {})",
                document.name,
                document.state.as_deref().unwrap_or("unknown")
            ))
        })?;
        stats.tier = document.tier.as_deref().and_then(|t| t.parse::<Tier>().ok());
        stats.state = document.state;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const PATH: &str = "/api/atlas/v2/groups/proj1/streams/ws1/processor/orders";

    fn client(server: &mockito::Server) -> AtlasClient {
        AtlasClient::new(
            &server.url(),
            "proj1",
            "ws1",
            Some("secret".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_stats_parses_processor_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", PATH)
            .match_query(Matcher::UrlEncoded("options.verbose".into(), "true".into()))
            .match_header("authorization", "Bearer secret")
            .match_header("accept", ACCEPT_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "name": "orders",
                    "state": "STARTED",
                    "tier": "SP10",
                    "stats": {
                        "inputMessageCount": 5000,
                        "outputMessageCount": 4990,
                        "dlqMessageCount": 0,
                        "memoryUsageBytes": 73400320,
                        "latency": {"p50": 1200, "p99": 8000}
                    }
                }"#,
            )
            .create_async()
            .await;

        let stats = client(&server).get_stats("orders").await.unwrap();
        mock.assert_async().await;

        assert_eq!(stats.input_message_count, 5000);
        assert_eq!(stats.tier, Some(Tier::T2));
        assert_eq!(stats.state.as_deref(), Some("STARTED"));
        assert_eq!(stats.latency.unwrap().p99, 8000.0);
    }

    #[tokio::test]
    async fn test_missing_processor_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server).get_stats("orders").await.unwrap_err();
        assert_eq!(err, SampleError::NotFound("orders".into()));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("try later")
            .create_async()
            .await;

        let err = client(&server).get_stats("orders").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, SampleError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_stopped_processor_without_stats() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"name": "orders", "state": "STOPPED"}"#)
            .create_async()
            .await;

        let err = client(&server).get_stats("orders").await.unwrap_err();
        match err {
            SampleError::Decode(msg) => assert!(msg.contains("STOPPED")),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
