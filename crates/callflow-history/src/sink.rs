use std::time::Duration;

use async_trait::async_trait;
use callflow_core::FullTranscriptPayload;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::signature::{sign, SIGNATURE_HEADER};

/// Destination of transcript snapshots.
#[async_trait]
pub trait HistorySink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one snapshot. Any error counts as a failed delivery.
    async fn send(&self, payload: &FullTranscriptPayload) -> Result<()>;
}

/// POSTs snapshots as JSON to `{base_url}/save-transcript`.
pub struct HttpHistorySink {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    secret: Option<String>,
}

impl HttpHistorySink {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        timeout: Duration,
        secret: Option<String>,
    ) -> Self {
        Self {
            client,
            url: format!("{}/save-transcript", base_url.trim_end_matches('/')),
            timeout,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HistorySink for HttpHistorySink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, payload: &FullTranscriptPayload) -> Result<()> {
        let body = serde_json::to_vec(payload)?;

        let mut req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            req = req.header(SIGNATURE_HEADER, sign(secret, &body).map_err(HistoryError::Signing)?);
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        debug!(call_id = %payload.call_id, status = status.as_u16(), "transcript delivered");
        Ok(())
    }
}
