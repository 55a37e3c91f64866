//! Outbound publication of storage advertisements.

use async_trait::async_trait;
use hoard_core::Advertisement;
use hoard_core::config::DiscoverySinkConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Where signed advertisements are announced.
///
/// The engine does not wait on the outcome beyond logging it.
#[async_trait]
pub trait DiscoverySink: Send + Sync + 'static {
    async fn publish(&self, advertisement: &Advertisement) -> DiscoveryResult<()>;

    async fn revoke(&self, _advertisement_id: Uuid) -> DiscoveryResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Writes advertisements to the log.
pub struct LogSink;

#[async_trait]
impl DiscoverySink for LogSink {
    async fn publish(&self, advertisement: &Advertisement) -> DiscoveryResult<()> {
        tracing::info!(
            advertisement_id = %advertisement.advertisement_id,
            hash = %advertisement.content_hash,
            provider = %advertisement.storage_provider,
            expires_at = %advertisement.expires_at,
            endpoints = ?advertisement.endpoints,
            "storage advertisement published"
        );
        Ok(())
    }

    async fn revoke(&self, advertisement_id: Uuid) -> DiscoveryResult<()> {
        tracing::info!(%advertisement_id, "storage advertisement revoked");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Drops everything.
pub struct NullSink;

#[async_trait]
impl DiscoverySink for NullSink {
    async fn publish(&self, _advertisement: &Advertisement) -> DiscoveryResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// POSTs each advertisement as JSON to `url` and DELETEs `url/<id>` on revoke.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> DiscoveryResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> DiscoveryResult<()> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoverySink for WebhookSink {
    async fn publish(&self, advertisement: &Advertisement) -> DiscoveryResult<()> {
        self.send(self.http.post(&self.url).json(advertisement)).await
    }

    async fn revoke(&self, advertisement_id: Uuid) -> DiscoveryResult<()> {
        let url = format!("{}/{advertisement_id}", self.url.trim_end_matches('/'));
        self.send(self.http.delete(url)).await
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Build the sink described by `config`.
pub fn from_config(config: &DiscoverySinkConfig) -> DiscoveryResult<Arc<dyn DiscoverySink>> {
    Ok(match config {
        DiscoverySinkConfig::Log => Arc::new(LogSink),
        DiscoverySinkConfig::None => Arc::new(NullSink),
        DiscoverySinkConfig::Webhook { url, timeout_ms } => {
            Arc::new(WebhookSink::new(url, Duration::from_millis(*timeout_ms))?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::{ContentAddress, StorageCapability};
    use httpmock::Method::{DELETE, POST};
    use httpmock::MockServer;
    use std::collections::BTreeSet;
    use std::net::TcpListener;
    use time::OffsetDateTime;

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn advertisement() -> Advertisement {
        Advertisement::new(
            ContentAddress::compute(b"advertised"),
            "test-provider",
            StorageCapability {
                max_file_size: 1024,
                supported_mime_types: vec!["*/*".to_string()],
                availability_guarantee: 0.99,
                bandwidth_mbps: 100,
                cost_per_gb_satoshis: 10,
                features: BTreeSet::new(),
            },
            vec!["http://node/overlay/data".to_string()],
            BTreeSet::from(["US".to_string()]),
            24,
            OffsetDateTime::now_utc(),
        )
    }

    #[tokio::test]
    async fn webhook_posts_and_deletes() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let ad = advertisement();

        let publish = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/ads")
                    .body_contains(ad.content_hash.to_string());
                then.status(202);
            })
            .await;
        let revoke = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path(format!("/ads/{}", ad.advertisement_id));
                then.status(204);
            })
            .await;

        let sink = WebhookSink::new(server.url("/ads"), Duration::from_secs(5)).unwrap();
        sink.publish(&ad).await.unwrap();
        sink.revoke(ad.advertisement_id).await.unwrap();

        publish.assert_async().await;
        revoke.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_surfaces_rejection() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ads");
                then.status(503).body("overloaded");
            })
            .await;

        let sink = WebhookSink::new(server.url("/ads"), Duration::from_secs(5)).unwrap();
        match sink.publish(&advertisement()).await {
            Err(DiscoveryError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn from_config_picks_sink() {
        assert_eq!(from_config(&DiscoverySinkConfig::Log).unwrap().name(), "log");
        assert_eq!(from_config(&DiscoverySinkConfig::None).unwrap().name(), "none");
        let webhook = DiscoverySinkConfig::Webhook {
            url: "http://127.0.0.1:1/ads".to_string(),
            timeout_ms: 100,
        };
        assert_eq!(from_config(&webhook).unwrap().name(), "webhook");
    }
}
