//! Tier 1: direct HTTP fetcher.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::models::{Tier, TransportError, TransportResponse};

use super::{DomainContext, TierFetcher};

pub const USER_AGENT: &str = "vintry/0.4 (product catalog research)";

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Base backoff for intra-tier network-error retries. Actual delay is
/// base * 2^attempt plus up to 1s of jitter.
const RETRY_BASE: Duration = Duration::from_millis(750);

/// Direct request fetcher: browser-like headers, per-domain cookie hints
/// (age-gate bypass cookies learned by the browser tier), and bounded
/// retry-with-backoff for transient network errors. Retries here are
/// intra-tier resilience only; blocking statuses and unusable content are
/// the escalation policy's business.
pub struct DirectFetcher {
    client: reqwest::Client,
    user_agent: Option<String>,
    max_retries: u32,
}

impl DirectFetcher {
    /// Create a direct fetcher. `user_agent`: None for the default agent,
    /// "impersonate" to rotate real browser agents, anything else verbatim.
    pub fn new(user_agent: Option<String>, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            user_agent,
            max_retries: max_retries.min(3),
        }
    }

    fn resolve_user_agent(&self) -> &str {
        match self.user_agent.as_deref() {
            None => USER_AGENT,
            Some("impersonate") => random_user_agent(),
            Some(custom) => custom,
        }
    }

    fn cookie_header(ctx: &DomainContext) -> Option<String> {
        if ctx.cookies.is_empty() {
            return None;
        }
        Some(
            ctx.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    async fn attempt(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, reqwest::Error> {
        let mut request = self
            .client
            .get(url)
            .timeout(timeout)
            .header("User-Agent", self.resolve_user_agent())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9");

        if let Some(cookies) = Self::cookie_header(ctx) {
            request = request.header("Cookie", cookies);
        }

        let start = Instant::now();
        let response = request.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let content = response.text().await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(TransportResponse {
            status,
            final_url,
            content,
            elapsed_ms,
            retry_after_secs,
            cookies: Vec::new(),
        })
    }
}

#[async_trait]
impl TierFetcher for DirectFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        let deadline = Instant::now() + timeout;

        for attempt in 0..=self.max_retries {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(timeout.as_millis() as u64));
            }

            match self.attempt(url, remaining, ctx).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() => {
                    return Err(TransportError::Timeout(timeout.as_millis() as u64));
                }
                Err(e) if e.is_connect() => {
                    // Transient network failure: back off and retry within
                    // this tier's own budget.
                    if attempt < self.max_retries {
                        let backoff = RETRY_BASE * 2u32.pow(attempt);
                        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                        warn!(
                            url,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Direct request failed, retrying after backoff"
                        );
                        tokio::time::sleep((backoff + jitter).min(remaining)).await;
                        continue;
                    }
                    return Err(TransportError::Network(e.to_string()));
                }
                Err(e) if e.is_body() || e.is_decode() => {
                    debug!(url, error = %e, "Direct request protocol error");
                    return Err(TransportError::Protocol(e.to_string()));
                }
                Err(e) => return Err(TransportError::Network(e.to_string())),
            }
        }

        Err(TransportError::Network("retry budget exhausted".to_string()))
    }

    fn tier(&self) -> Tier {
        Tier::Direct
    }
}

/// Get a random user agent for impersonate mode.
pub fn random_user_agent() -> &'static str {
    let idx = rand::rng().random_range(0..IMPERSONATE_USER_AGENTS.len());
    IMPERSONATE_USER_AGENTS[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainCookie;

    fn cookie(name: &str, value: &str) -> DomainCookie {
        DomainCookie {
            name: name.into(),
            value: value.into(),
            domain: "shop.example.com".into(),
            path: "/".into(),
            secure: false,
            http_only: false,
        }
    }

    #[test]
    fn test_cookie_header_joins_hints() {
        let ctx = DomainContext {
            domain: "shop.example.com".into(),
            cookies: vec![cookie("age_verified", "1"), cookie("session", "abc")],
            product_type_hint: None,
        };
        assert_eq!(
            DirectFetcher::cookie_header(&ctx).as_deref(),
            Some("age_verified=1; session=abc")
        );

        let empty = DomainContext::default();
        assert_eq!(DirectFetcher::cookie_header(&empty), None);
    }

    #[test]
    fn test_user_agent_resolution() {
        let default = DirectFetcher::new(None, 2);
        assert!(default.resolve_user_agent().contains("vintry"));

        let impersonate = DirectFetcher::new(Some("impersonate".into()), 2);
        assert!(impersonate.resolve_user_agent().contains("Mozilla"));

        let custom = DirectFetcher::new(Some("CatalogBot/1.0".into()), 2);
        assert_eq!(custom.resolve_user_agent(), "CatalogBot/1.0");
    }

    #[test]
    fn test_retry_budget_is_capped() {
        let fetcher = DirectFetcher::new(None, 9);
        assert_eq!(fetcher.max_retries, 3);
    }
}
