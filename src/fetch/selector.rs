//! Starting-tier selection from a domain's learned profile.

use chrono::{DateTime, Duration, Utc};

use crate::config::RouterConfig;
use crate::models::{DomainProfile, Tier};

/// Pick the cheapest tier likely to succeed for this domain.
///
/// Decision order:
/// (a) active sticky Tier 3 flag wins unconditionally;
/// (b) with enough samples, strong Tier 3 history over a failing Tier 1
///     jumps straight to Tier 3;
/// (c) likewise for Tier 2;
/// (d) a JS-heavy domain starts at the browser tier;
/// (e) a bot-protected domain starts at the paid tier;
/// (f) otherwise the cheapest tier.
pub fn select_starting_tier(
    profile: &DomainProfile,
    cfg: &RouterConfig,
    now: DateTime<Utc>,
) -> Tier {
    if profile.sticky_tier3_active(Duration::days(cfg.sticky_tier3_expiry_days), now) {
        return Tier::RenderApi;
    }

    if profile.sample_count >= cfg.min_samples_for_shortcuts {
        if profile.tier3_success_rate > cfg.tier3_fast_path_rate
            && profile.tier1_success_rate < cfg.tier1_giveup_rate
        {
            return Tier::RenderApi;
        }
        if profile.tier2_success_rate > cfg.tier2_fast_path_rate
            && profile.tier1_success_rate < cfg.tier1_weak_rate
        {
            return Tier::Browser;
        }
    }

    if profile.likely_js_heavy {
        return Tier::Browser;
    }
    if profile.likely_bot_protected {
        return Tier::RenderApi;
    }

    Tier::Direct
}
