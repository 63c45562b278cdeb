//! Per-domain learned fetch behavior.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::fetch::Tier;

/// Learned, persisted record of a domain's historical fetch behavior.
///
/// Treated as an immutable value: the feedback recorder produces a new
/// profile from the old one plus an attempt outcome, and the router writes
/// it back. Profiles are soft state — the store may expire them at any time
/// and losing one only costs re-learning, never correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub domain: String,

    /// All-time counters, not reset by the EMA.
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub timeout_count: u64,
    /// Total recorded attempts, for minimum-sample-size gates.
    #[serde(default)]
    pub sample_count: u64,

    /// Per-tier success rates in [0,1], EMA-updated. Initialized to 1.0 so
    /// unseen domains start at the cheapest tier.
    pub tier1_success_rate: f64,
    pub tier2_success_rate: f64,
    pub tier3_success_rate: f64,

    /// EMA of successful fetch latency.
    pub avg_response_time_ms: f64,

    /// Behavioral flags, set once by the feedback recorder and never
    /// cleared automatically.
    #[serde(default)]
    pub likely_js_heavy: bool,
    #[serde(default)]
    pub likely_bot_protected: bool,
    #[serde(default)]
    pub likely_slow: bool,

    /// Cached tier-selector output for cheap reads.
    pub recommended_tier: Tier,
    /// Cached baseline timeout.
    pub recommended_timeout_ms: u64,

    /// Sticky circuit breaker: skip Tiers 1-2 while active.
    #[serde(default)]
    pub requires_tier3: bool,
    pub requires_tier3_since: Option<DateTime<Utc>>,

    pub last_updated: Option<DateTime<Utc>>,
    pub last_successful_fetch: Option<DateTime<Utc>>,
}

impl DomainProfile {
    /// Fresh optimistic profile for an unseen domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            success_count: 0,
            timeout_count: 0,
            sample_count: 0,
            tier1_success_rate: 1.0,
            tier2_success_rate: 1.0,
            tier3_success_rate: 1.0,
            avg_response_time_ms: 0.0,
            likely_js_heavy: false,
            likely_bot_protected: false,
            likely_slow: false,
            recommended_tier: Tier::Direct,
            recommended_timeout_ms: 0,
            requires_tier3: false,
            requires_tier3_since: None,
            last_updated: None,
            last_successful_fetch: None,
        }
    }

    /// Success rate for one tier.
    pub fn success_rate_for(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Direct => self.tier1_success_rate,
            Tier::Browser => self.tier2_success_rate,
            Tier::RenderApi => self.tier3_success_rate,
        }
    }

    /// Set the success rate for one tier, returning the updated profile.
    pub fn with_success_rate(mut self, tier: Tier, rate: f64) -> Self {
        match tier {
            Tier::Direct => self.tier1_success_rate = rate,
            Tier::Browser => self.tier2_success_rate = rate,
            Tier::RenderApi => self.tier3_success_rate = rate,
        }
        self
    }

    /// Whether the sticky Tier 3 flag is set and has not yet expired.
    pub fn sticky_tier3_active(&self, expiry: Duration, now: DateTime<Utc>) -> bool {
        if !self.requires_tier3 {
            return false;
        }
        match self.requires_tier3_since {
            Some(since) => now - since < expiry,
            // Flag without a timestamp: treat as active so a malformed
            // record degrades toward the tier that was known to work.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_is_optimistic() {
        let p = DomainProfile::new("shop.example.com");
        assert_eq!(p.tier1_success_rate, 1.0);
        assert_eq!(p.tier3_success_rate, 1.0);
        assert_eq!(p.recommended_tier, Tier::Direct);
        assert!(!p.requires_tier3);
        assert_eq!(p.sample_count, 0);
    }

    #[test]
    fn test_sticky_tier3_expiry() {
        let now = Utc::now();
        let mut p = DomainProfile::new("shop.example.com");
        p.requires_tier3 = true;
        p.requires_tier3_since = Some(now - Duration::days(1));

        assert!(p.sticky_tier3_active(Duration::days(3), now));
        assert!(!p.sticky_tier3_active(Duration::hours(12), now));
    }

    #[test]
    fn test_sticky_tier3_without_timestamp_stays_active() {
        let mut p = DomainProfile::new("shop.example.com");
        p.requires_tier3 = true;
        assert!(p.sticky_tier3_active(Duration::days(3), Utc::now()));
    }

    #[test]
    fn test_profile_serde_round_trip() {
        let mut p = DomainProfile::new("shop.example.com");
        p.tier1_success_rate = 0.25;
        p.likely_slow = true;
        p.last_updated = Some(Utc::now());

        let json = serde_json::to_string(&p).unwrap();
        let back: DomainProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
