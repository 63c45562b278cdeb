//! Per-attempt timeout computation.

use std::time::Duration;

use crate::config::RouterConfig;
use crate::models::DomainProfile;

/// Compute the timeout for one attempt within a logical fetch.
///
/// The baseline is the domain's learned timeout when enough successes have
/// been recorded, else the conservative default. It doubles per attempt
/// index (10s, 20s, 40s), doubles once more for domains flagged slow, and
/// is clamped between the baseline and the hard ceiling.
pub fn timeout_for(profile: &DomainProfile, attempt_index: u32, cfg: &RouterConfig) -> Duration {
    let baseline = if profile.success_count >= cfg.min_successes_for_baseline
        && profile.recommended_timeout_ms > 0
    {
        profile.recommended_timeout_ms
    } else {
        cfg.base_timeout_ms
    };

    // Saturating shift; attempt indexes stay tiny but a bad caller must not
    // be able to overflow into a zero timeout.
    let mut timeout_ms = baseline.saturating_mul(1u64 << attempt_index.min(6));
    if profile.likely_slow {
        timeout_ms = timeout_ms.saturating_mul(2);
    }

    Duration::from_millis(timeout_ms.clamp(baseline, cfg.max_timeout_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression_doubles_up_to_ceiling() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");

        assert_eq!(timeout_for(&p, 0, &cfg), Duration::from_millis(10_000));
        assert_eq!(timeout_for(&p, 1, &cfg), Duration::from_millis(20_000));
        assert_eq!(timeout_for(&p, 2, &cfg), Duration::from_millis(40_000));
        // Fourth attempt would be 80s; clamped to the ceiling.
        assert_eq!(timeout_for(&p, 3, &cfg), Duration::from_millis(60_000));
    }

    #[test]
    fn test_likely_slow_doubles_again() {
        let cfg = RouterConfig::default();
        let mut p = DomainProfile::new("shop.example.com");
        p.likely_slow = true;

        assert_eq!(timeout_for(&p, 0, &cfg), Duration::from_millis(20_000));
        assert_eq!(timeout_for(&p, 1, &cfg), Duration::from_millis(40_000));
        assert_eq!(timeout_for(&p, 2, &cfg), Duration::from_millis(60_000));
    }

    #[test]
    fn test_learned_baseline_needs_successes() {
        let cfg = RouterConfig::default();
        let mut p = DomainProfile::new("shop.example.com");
        p.recommended_timeout_ms = 6_000;
        p.success_count = 2;
        // Not enough history: conservative default applies.
        assert_eq!(timeout_for(&p, 0, &cfg), Duration::from_millis(10_000));

        p.success_count = 5;
        assert_eq!(timeout_for(&p, 0, &cfg), Duration::from_millis(6_000));
        assert_eq!(timeout_for(&p, 1, &cfg), Duration::from_millis(12_000));
    }

    #[test]
    fn test_never_below_baseline() {
        let cfg = RouterConfig::default();
        let p = DomainProfile::new("shop.example.com");
        for attempt in 0..8 {
            let t = timeout_for(&p, attempt, &cfg);
            assert!(t >= Duration::from_millis(cfg.base_timeout_ms));
            assert!(t <= Duration::from_millis(cfg.max_timeout_ms));
        }
    }
}
