//! HttpSink - インデクサの bulk API への配送
//!
//! `POST {base_url}enqueue` に JSON 配列を 1 回送るだけです。
//! リトライはキュー側の責務なので、ここでは 1 回の試行だけを扱います。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{RawEvent, SinkError};
use crate::ports::{Ack, BatchSink};

/// Path of the bulk endpoint, relative to `base_url`.
pub const ENQUEUE_PATH: &str = "enqueue";

/// Sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Base URL of the indexer API.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            timeout_secs: 30,
        }
    }
}

pub struct HttpSink {
    client: Client,
    endpoint: Url,
}

impl HttpSink {
    /// Builds the client and resolves the endpoint once.
    ///
    /// An unparsable `base_url` is a setup error, never a retryable one.
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let endpoint = enqueue_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn enqueue_url(base_url: &str) -> Result<Url, SinkError> {
    let invalid = |reason: String| SinkError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };

    // "http://host/api" と "http://host/api/" を同じに扱う
    let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(invalid("not a base url".to_string()));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(ENQUEUE_PATH).map_err(|e| invalid(e.to_string()))
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn deliver(&self, events: &[&RawEvent]) -> Result<Ack, SinkError> {
        debug!(url = %self.endpoint, events = events.len(), "Sending batch");
        let started = Instant::now();

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(events)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch accepted"
        );
        Ok(Ack {
            status: status.as_u16(),
        })
    }
}
