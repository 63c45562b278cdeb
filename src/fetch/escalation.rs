//! Escalation state machine: same outcome rules at every tier.

use crate::models::{SoftFailure, Tier};

/// What the router does after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Usable content; terminal.
    Succeed,
    /// Failed attempt with a more expensive tier remaining.
    Escalate(Tier),
    /// Failed attempt at the tier ceiling; terminal.
    Fail,
}

/// Decide the transition out of one attempt.
///
/// A transport-successful attempt with no soft-failure classification is
/// terminal success. Anything else — transport error, blocking status, or
/// content classified as unusable — escalates to the next tier if one
/// remains. Blocking statuses (403/429) arrive here as
/// [`SoftFailure::BlockedStatus`], so they escalate regardless of what the
/// domain profile says; nothing is ever retried at the same tier by this
/// policy (intra-tier retry is the direct fetcher's own network-error
/// resilience, not an escalation concern).
pub fn decide(tier: Tier, transport_ok: bool, soft_failure: Option<&SoftFailure>) -> Decision {
    if transport_ok && soft_failure.is_none() {
        return Decision::Succeed;
    }
    match tier.next() {
        Some(next) => Decision::Escalate(next),
        None => Decision::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TIERS: [Tier; 3] = [Tier::Direct, Tier::Browser, Tier::RenderApi];

    #[test]
    fn test_clean_success_is_terminal_at_any_tier() {
        for tier in ALL_TIERS {
            assert_eq!(decide(tier, true, None), Decision::Succeed);
        }
    }

    #[test]
    fn test_escalation_is_strictly_monotonic() {
        for tier in ALL_TIERS {
            match decide(tier, false, None) {
                Decision::Escalate(next) => assert!(next > tier),
                Decision::Fail => assert_eq!(tier, Tier::RenderApi),
                Decision::Succeed => panic!("failed attempt cannot succeed"),
            }
        }
    }

    #[test]
    fn test_blocking_status_always_escalates() {
        for status in [403u16, 429] {
            let soft = SoftFailure::BlockedStatus { status };
            assert_eq!(
                decide(Tier::Direct, true, Some(&soft)),
                Decision::Escalate(Tier::Browser)
            );
            assert_eq!(
                decide(Tier::Browser, true, Some(&soft)),
                Decision::Escalate(Tier::RenderApi)
            );
        }
    }

    #[test]
    fn test_soft_failure_at_ceiling_fails() {
        let soft = SoftFailure::Captcha {
            signature: "g-recaptcha".into(),
        };
        assert_eq!(decide(Tier::RenderApi, true, Some(&soft)), Decision::Fail);
    }

    #[test]
    fn test_transport_error_at_ceiling_fails() {
        assert_eq!(decide(Tier::RenderApi, false, None), Decision::Fail);
    }
}
