//! Fetch result and transport types shared across the tier fetchers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fetch strategy tier, ordered by cost and capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: direct HTTP request.
    Direct,
    /// Tier 2: headless browser rendering.
    Browser,
    /// Tier 3: paid third-party rendering/proxy service.
    RenderApi,
}

impl Tier {
    /// The next more expensive tier, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Direct => Some(Tier::Browser),
            Tier::Browser => Some(Tier::RenderApi),
            Tier::RenderApi => None,
        }
    }

    /// Numeric tier (1-based), for logs and CLI flags.
    pub fn as_number(self) -> u8 {
        match self {
            Tier::Direct => 1,
            Tier::Browser => 2,
            Tier::RenderApi => 3,
        }
    }

    /// Parse a 1-based tier number.
    pub fn from_number(n: u8) -> Option<Tier> {
        match n {
            1 => Some(Tier::Direct),
            2 => Some(Tier::Browser),
            3 => Some(Tier::RenderApi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Direct => write!(f, "direct"),
            Tier::Browser => write!(f, "browser"),
            Tier::RenderApi => write!(f, "render_api"),
        }
    }
}

/// Uniform result of one tier fetcher call with successful transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code. Rendered tiers report 200 when content arrived.
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    /// Raw page content.
    pub content: String,
    /// Wall-clock time for the call.
    pub elapsed_ms: u64,
    /// Retry-After header in seconds, when the site sent one.
    pub retry_after_secs: Option<u64>,
    /// Session cookies harvested during the fetch (browser tier only).
    pub cookies: Vec<DomainCookie>,
}

/// Transport-level failure of one tier fetcher call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Fetcher cannot run at all (e.g. browser support not compiled in).
    #[error("fetcher unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Classification of a transport-successful response whose content is
/// nonetheless unusable. Closed set of variants; the diagnostic payload
/// preserves what triggered the classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftFailure {
    /// Blocking HTTP status (403 or 429).
    BlockedStatus { status: u16 },
    /// Bot-challenge page (Cloudflare, DDoS-Guard, etc).
    Challenge { signature: String },
    /// CAPTCHA page.
    Captcha { signature: String },
    /// JavaScript-only placeholder: short body with no visible text.
    JsPlaceholder { content_len: usize },
    /// Age-verification interstitial.
    AgeGated { matched_phrase: Option<String> },
    /// Transport looked fine but this tier historically fails here.
    LowHistoricalSuccess { rate: f64 },
}

impl SoftFailure {
    /// Stable reason tag used in failure records and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            SoftFailure::BlockedStatus { status: 403 } => "blocked_403",
            SoftFailure::BlockedStatus { .. } => "rate_limited_429",
            SoftFailure::Challenge { .. } => "challenge_page",
            SoftFailure::Captcha { .. } => "captcha_detected",
            SoftFailure::JsPlaceholder { .. } => "js_placeholder",
            SoftFailure::AgeGated { .. } => "age_gated",
            SoftFailure::LowHistoricalSuccess { .. } => "low_historical_success",
        }
    }
}

impl std::fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoftFailure::BlockedStatus { status } => write!(f, "blocked by HTTP {status}"),
            SoftFailure::Challenge { signature } => write!(f, "challenge page ({signature})"),
            SoftFailure::Captcha { signature } => write!(f, "captcha ({signature})"),
            SoftFailure::JsPlaceholder { content_len } => {
                write!(f, "js placeholder ({content_len} bytes, no visible text)")
            }
            SoftFailure::AgeGated { matched_phrase: Some(p) } => write!(f, "age gate (\"{p}\")"),
            SoftFailure::AgeGated { matched_phrase: None } => write!(f, "age gate (short body)"),
            SoftFailure::LowHistoricalSuccess { rate } => {
                write!(f, "tier success rate {rate:.2} below floor")
            }
        }
    }
}

/// Caller-provided routing hints.
#[derive(Debug, Clone, Default)]
pub struct FetchHints {
    /// Start at this tier instead of consulting the domain profile.
    pub force_tier: Option<Tier>,
    /// Free-form product category hint, passed through to fetchers.
    pub product_type_hint: Option<String>,
}

/// Summary of one tier attempt within a logical fetch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    pub tier: Tier,
    pub timeout_ms: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// HTTP status, when transport completed.
    pub status: Option<u16>,
    /// Transport error text, when it did not.
    pub error: Option<String>,
    pub soft_failure: Option<SoftFailure>,
}

impl FetchAttempt {
    /// Whether this attempt yielded usable content.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.soft_failure.is_none()
    }
}

/// Final result of a logical fetch, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,
    pub succeeded: bool,
    /// Page content from the winning attempt.
    pub content: Option<String>,
    /// URL after redirects, from the winning attempt.
    pub final_url: Option<String>,
    /// Tier of the last attempt in `attempts`.
    pub final_tier: Option<Tier>,
    /// Ordered attempt history for observability and cost accounting.
    pub attempts: Vec<FetchAttempt>,
    pub total_elapsed_ms: u64,
}

/// Monetary cost unit emitted once per paid-tier call.
#[derive(Debug, Clone, Serialize)]
pub struct CostRecord {
    pub domain: String,
    pub url: String,
    pub tier: Tier,
    pub cost_units: f64,
    pub at: DateTime<Utc>,
}

/// Failure record emitted per failed attempt for external error logging.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub domain: String,
    pub url: String,
    pub tier: Tier,
    /// Classification reason tag or transport error text.
    pub reason: String,
    pub status: Option<u16>,
    /// Retry-After header value in seconds, when the site sent one.
    pub retry_after_secs: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Cookie hint shared between tiers through the profile store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_and_next() {
        assert!(Tier::Direct < Tier::Browser);
        assert!(Tier::Browser < Tier::RenderApi);
        assert_eq!(Tier::Direct.next(), Some(Tier::Browser));
        assert_eq!(Tier::Browser.next(), Some(Tier::RenderApi));
        assert_eq!(Tier::RenderApi.next(), None);
    }

    #[test]
    fn test_tier_number_round_trip() {
        for n in 1..=3 {
            assert_eq!(Tier::from_number(n).unwrap().as_number(), n);
        }
        assert_eq!(Tier::from_number(0), None);
        assert_eq!(Tier::from_number(4), None);
    }

    #[test]
    fn test_soft_failure_reason_tags() {
        assert_eq!(SoftFailure::BlockedStatus { status: 403 }.reason(), "blocked_403");
        assert_eq!(SoftFailure::BlockedStatus { status: 429 }.reason(), "rate_limited_429");
        assert_eq!(
            SoftFailure::AgeGated { matched_phrase: None }.reason(),
            "age_gated"
        );
    }

    #[test]
    fn test_attempt_succeeded() {
        let attempt = FetchAttempt {
            tier: Tier::Direct,
            timeout_ms: 10_000,
            started_at: Utc::now(),
            elapsed_ms: 120,
            status: Some(200),
            error: None,
            soft_failure: None,
        };
        assert!(attempt.succeeded());

        let soft = FetchAttempt {
            soft_failure: Some(SoftFailure::Captcha {
                signature: "g-recaptcha".into(),
            }),
            ..attempt.clone()
        };
        assert!(!soft.succeeded());
    }
}
