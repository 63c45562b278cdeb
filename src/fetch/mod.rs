//! The adaptive multi-tier fetch core.
//!
//! Three tier fetchers of increasing cost (direct request, headless browser,
//! paid rendering API) behind one trait, plus the routing machinery that
//! picks the cheapest tier likely to succeed, detects soft failures, and
//! learns per-domain behavior from outcomes.

mod browser;
mod classifier;
mod direct;
mod escalation;
mod feedback;
mod monitor;
mod pacer;
mod render_api;
mod router;
mod selector;
mod timeout;

pub use browser::{BrowserFetcher, BrowserTierConfig};
pub use classifier::classify;
pub use direct::DirectFetcher;
pub use escalation::{decide, Decision};
pub use feedback::{record, AttemptOutcome};
pub use monitor::FailureMonitor;
pub use pacer::Pacer;
pub use render_api::{RenderApiError, RenderApiFetcher};
pub use router::Router;
pub use selector::select_starting_tier;
pub use timeout::timeout_for;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{DomainCookie, Tier, TransportError, TransportResponse};

/// Per-domain context passed to tier fetchers: cookie hints read from the
/// shared store (age-gate bypass cookies in particular) and any caller
/// hints about the page being fetched.
#[derive(Debug, Clone, Default)]
pub struct DomainContext {
    pub domain: String,
    pub cookies: Vec<DomainCookie>,
    pub product_type_hint: Option<String>,
}

/// One fetch strategy. Implementations must honor `timeout` and return
/// promptly on expiry rather than leaking the underlying connection or
/// browser page; the router additionally enforces the deadline with
/// cancellation.
#[async_trait]
pub trait TierFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError>;

    fn tier(&self) -> Tier;

    /// Monetary cost units per call. Non-zero only for paid tiers.
    fn cost_units(&self) -> f64 {
        0.0
    }
}

/// Extract the fetch-target domain (hostname) from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://shop.example.com/products/gin-42"),
            Some("shop.example.com".to_string())
        );
        assert_eq!(
            extract_domain("http://example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("not a url"), None);
    }
}
