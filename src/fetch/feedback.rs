//! Feedback recording: fold one attempt outcome into a domain profile.

use chrono::{DateTime, Utc};

use crate::config::RouterConfig;
use crate::models::{DomainProfile, SoftFailure, Tier};

use super::selector::select_starting_tier;

/// Everything the recorder needs to know about one finished attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub tier: Tier,
    /// Transport completed and nothing was soft-failure classified.
    pub success: bool,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub soft_failure: Option<SoftFailure>,
    pub at: DateTime<Utc>,
}

/// Produce the updated profile for one attempt outcome.
///
/// Pure function of (profile, outcome): the success rate of the tier just
/// used moves by `rate' = rate*(1-alpha) + outcome*alpha`, latency is
/// EMA-updated on success only, behavioral flags latch on the first
/// matching observation, and the cached recommendations are refreshed.
/// Because it is a pure fold it can be re-applied under read-modify-write
/// races against the store; lost updates cost convergence speed, not
/// correctness.
pub fn record(
    profile: &DomainProfile,
    outcome: &AttemptOutcome,
    cfg: &RouterConfig,
) -> DomainProfile {
    let alpha = cfg.ema_alpha;
    let observed = if outcome.success { 1.0 } else { 0.0 };

    let old_rate = profile.success_rate_for(outcome.tier);
    let mut updated = profile
        .clone()
        .with_success_rate(outcome.tier, old_rate * (1.0 - alpha) + observed * alpha);

    updated.sample_count += 1;
    updated.last_updated = Some(outcome.at);

    if outcome.success {
        updated.success_count += 1;
        updated.last_successful_fetch = Some(outcome.at);
        updated.avg_response_time_ms = if updated.avg_response_time_ms == 0.0 {
            outcome.elapsed_ms as f64
        } else {
            updated.avg_response_time_ms * (1.0 - alpha) + outcome.elapsed_ms as f64 * alpha
        };
    }

    if outcome.timed_out {
        updated.timeout_count += 1;
        updated.likely_slow = true;
    }

    match outcome.soft_failure {
        Some(SoftFailure::JsPlaceholder { .. }) => updated.likely_js_heavy = true,
        Some(SoftFailure::Challenge { .. })
        | Some(SoftFailure::Captcha { .. })
        | Some(SoftFailure::BlockedStatus { .. }) => updated.likely_bot_protected = true,
        _ => {}
    }

    // Refresh the cached recommendations so readers that never run the
    // selector still see a current answer.
    updated.recommended_timeout_ms = recommended_timeout(&updated, cfg);
    updated.recommended_tier = select_starting_tier(&updated, cfg, outcome.at);

    updated
}

/// Baseline timeout derived from observed latency: three times the average
/// successful response time, clamped to the configured floor and ceiling.
fn recommended_timeout(profile: &DomainProfile, cfg: &RouterConfig) -> u64 {
    if profile.success_count < cfg.min_successes_for_baseline || profile.avg_response_time_ms == 0.0
    {
        return cfg.base_timeout_ms;
    }
    ((profile.avg_response_time_ms * 3.0) as u64)
        .clamp(cfg.min_recommended_timeout_ms, cfg.max_timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(tier: Tier, elapsed_ms: u64) -> AttemptOutcome {
        AttemptOutcome {
            tier,
            success: true,
            elapsed_ms,
            timed_out: false,
            soft_failure: None,
            at: Utc::now(),
        }
    }

    fn failure(tier: Tier, soft_failure: Option<SoftFailure>) -> AttemptOutcome {
        AttemptOutcome {
            tier,
            success: false,
            elapsed_ms: 0,
            timed_out: false,
            soft_failure,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_ema_converges_to_one_on_repeated_success() {
        let cfg = RouterConfig::default();
        for start in [0.0, 0.3, 0.7, 1.0] {
            let mut p = DomainProfile::new("shop.example.com").with_success_rate(Tier::Direct, start);
            for _ in 0..60 {
                p = record(&p, &success(Tier::Direct, 100), &cfg);
            }
            assert!(
                p.tier1_success_rate > 0.99,
                "rate from start {start} only reached {}",
                p.tier1_success_rate
            );
        }
    }

    #[test]
    fn test_ema_converges_to_zero_on_repeated_failure() {
        let cfg = RouterConfig::default();
        for start in [0.0, 0.3, 0.7, 1.0] {
            let mut p = DomainProfile::new("shop.example.com").with_success_rate(Tier::Direct, start);
            for _ in 0..60 {
                p = record(&p, &failure(Tier::Direct, None), &cfg);
            }
            assert!(
                p.tier1_success_rate < 0.01,
                "rate from start {start} only fell to {}",
                p.tier1_success_rate
            );
        }
    }

    #[test]
    fn test_single_failure_moves_rate_by_alpha() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");
        let updated = record(&p, &failure(Tier::Direct, None), &cfg);
        assert!((updated.tier1_success_rate - 0.8).abs() < 1e-9);
        // Other tiers untouched.
        assert_eq!(updated.tier2_success_rate, 1.0);
        assert_eq!(updated.tier3_success_rate, 1.0);
    }

    #[test]
    fn test_latency_ema_on_success_only() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");

        let after_success = record(&p, &success(Tier::Direct, 400), &cfg);
        assert_eq!(after_success.avg_response_time_ms, 400.0);

        let after_failure = record(&after_success, &failure(Tier::Direct, None), &cfg);
        assert_eq!(after_failure.avg_response_time_ms, 400.0);
    }

    #[test]
    fn test_counters_and_timestamps() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");

        let s = record(&p, &success(Tier::Direct, 100), &cfg);
        assert_eq!(s.success_count, 1);
        assert_eq!(s.sample_count, 1);
        assert!(s.last_successful_fetch.is_some());

        let timeout = AttemptOutcome {
            timed_out: true,
            ..failure(Tier::Direct, None)
        };
        let t = record(&s, &timeout, &cfg);
        assert_eq!(t.timeout_count, 1);
        assert_eq!(t.sample_count, 2);
        assert!(t.likely_slow);
        // Success counter untouched by the failed attempt.
        assert_eq!(t.success_count, 1);
    }

    #[test]
    fn test_flags_latch_from_soft_failures() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");

        let js = record(
            &p,
            &failure(Tier::Direct, Some(SoftFailure::JsPlaceholder { content_len: 80 })),
            &cfg,
        );
        assert!(js.likely_js_heavy);
        assert!(!js.likely_bot_protected);

        let blocked = record(
            &js,
            &failure(Tier::Direct, Some(SoftFailure::BlockedStatus { status: 403 })),
            &cfg,
        );
        assert!(blocked.likely_bot_protected);
        // Flags never clear, even after later successes.
        let recovered = record(&blocked, &success(Tier::Direct, 100), &cfg);
        assert!(recovered.likely_js_heavy);
        assert!(recovered.likely_bot_protected);
    }

    #[test]
    fn test_recommended_timeout_tracks_latency() {
        let cfg = RouterConfig::default();
        let mut p = DomainProfile::new("shop.example.com");
        for _ in 0..cfg.min_successes_for_baseline {
            p = record(&p, &success(Tier::Direct, 2_000), &cfg);
        }
        assert_eq!(p.recommended_timeout_ms, 6_000);

        // Very fast domains still get the configured floor.
        let mut fast = DomainProfile::new("fast.example.com");
        for _ in 0..cfg.min_successes_for_baseline {
            fast = record(&fast, &success(Tier::Direct, 50), &cfg);
        }
        assert_eq!(fast.recommended_timeout_ms, cfg.min_recommended_timeout_ms);
    }

    #[test]
    fn test_recorder_is_pure() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");
        let outcome = success(Tier::Direct, 100);
        let a = record(&p, &outcome, &cfg);
        let b = record(&p, &outcome, &cfg);
        assert_eq!(a, b);
        // Input untouched.
        assert_eq!(p.sample_count, 0);
    }
}
