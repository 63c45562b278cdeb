//! Tier 3: paid third-party rendering/proxy service.
//!
//! Delegates the whole fetch to a remote rendering API that runs its own
//! browser fleet and residential proxies. Every call costs money; the
//! router records one cost unit per call for the external ledger.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Tier, TransportError, TransportResponse};

use super::{DomainContext, TierFetcher};

#[derive(Debug, Error)]
pub enum RenderApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for RenderApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RenderApiError::Timeout
        } else {
            RenderApiError::Network(err.to_string())
        }
    }
}

pub struct RenderApiFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cost_units: f64,
}

impl RenderApiFetcher {
    pub fn new(base_url: &str, token: Option<&str>, cost_units: f64) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            cost_units,
        }
    }

    /// Fetch fully-rendered HTML for a URL via the service's /content
    /// endpoint.
    async fn content(&self, url: &str, timeout: Duration) -> Result<String, RenderApiError> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": { "timeout": timeout.as_millis() as u64 },
        });

        let resp = self
            .client
            .post(&endpoint)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl TierFetcher for RenderApiFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        _ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();

        let content = self.content(url, timeout).await.map_err(|e| match e {
            RenderApiError::Timeout => TransportError::Timeout(timeout.as_millis() as u64),
            RenderApiError::Network(msg) => TransportError::Network(msg),
            RenderApiError::Api { status, message } => {
                TransportError::Protocol(format!("render API {status}: {message}"))
            }
        })?;

        Ok(TransportResponse {
            // The service returns rendered HTML without the origin status;
            // content that arrived is judged by the classifier.
            status: 200,
            final_url: url.to_string(),
            content,
            elapsed_ms: start.elapsed().as_millis() as u64,
            retry_after_secs: None,
            cookies: Vec::new(),
        })
    }

    fn tier(&self) -> Tier {
        Tier::RenderApi
    }

    fn cost_units(&self) -> f64 {
        self.cost_units
    }
}
