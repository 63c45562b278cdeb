//! Soft-failure classification of transport-successful responses.
//!
//! A 200 with a bot-challenge interstitial, a CAPTCHA, an empty JS shell,
//! or an age gate is not a successful fetch. This module decides whether
//! content "looks" usable; it never interprets the content beyond that.

use regex::RegexSetBuilder;
use scraper::Html;

use crate::config::RouterConfig;
use crate::models::{DomainProfile, SoftFailure, Tier, TransportResponse};

/// Markup/script signatures of bot-challenge providers.
const CHALLENGE_SIGNATURES: &[(&str, &str)] = &[
    ("cf-browser-verification", "cloudflare"),
    ("cf_chl_opt", "cloudflare"),
    ("challenge-platform", "cloudflare"),
    ("_Incapsula_Resource", "imperva"),
    ("ddos-guard", "ddos-guard"),
    ("px-captcha", "perimeterx"),
    ("Checking your browser before accessing", "cloudflare"),
    ("Pardon Our Interruption", "distil"),
    ("Request unsuccessful. Incapsula incident", "imperva"),
];

/// Markup signatures of CAPTCHA widgets.
const CAPTCHA_SIGNATURES: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "cf-turnstile",
    "data-sitekey",
    "recaptcha/api.js",
    "hcaptcha.com/1/api.js",
];

/// Classify a transport-successful response.
///
/// Triggers in priority order: blocking status (403/429), challenge page,
/// CAPTCHA, JS-only placeholder, age gate, then the learned
/// low-historical-success trigger for domains that return syntactically
/// valid but semantically empty pages at this tier.
pub fn classify(
    resp: &TransportResponse,
    profile: &DomainProfile,
    tier: Tier,
    cfg: &RouterConfig,
) -> Option<SoftFailure> {
    if resp.status == 403 || resp.status == 429 {
        return Some(SoftFailure::BlockedStatus { status: resp.status });
    }

    let content = resp.content.as_str();

    for (signature, provider) in CHALLENGE_SIGNATURES {
        if content.contains(signature) {
            return Some(SoftFailure::Challenge {
                signature: format!("{provider}:{signature}"),
            });
        }
    }

    for signature in CAPTCHA_SIGNATURES {
        if content.contains(signature) {
            return Some(SoftFailure::Captcha {
                signature: signature.to_string(),
            });
        }
    }

    let content_len = content.chars().count();
    let short = content_len < cfg.placeholder_min_len;

    if short && visible_text_len(content) == 0 {
        return Some(SoftFailure::JsPlaceholder { content_len });
    }

    if let Some(matched) = match_age_phrase(content, &cfg.age_gate_phrases) {
        return Some(SoftFailure::AgeGated {
            matched_phrase: Some(matched),
        });
    }
    if short {
        return Some(SoftFailure::AgeGated { matched_phrase: None });
    }

    let rate = profile.success_rate_for(tier);
    if rate < cfg.low_success_floor {
        return Some(SoftFailure::LowHistoricalSuccess { rate });
    }

    None
}

/// Total length of text visible to a reader: text nodes outside
/// script/style/noscript/template subtrees.
fn visible_text_len(html: &str) -> usize {
    let document = Html::parse_document(html);
    let mut len = 0;

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(e.name(), "script" | "style" | "noscript" | "template" | "head")
            })
        });
        if !hidden {
            len += text.text.trim().len();
        }
    }

    len
}

/// Case-insensitive search for any configured age-verification phrase.
/// Returns the phrase that matched.
fn match_age_phrase(content: &str, phrases: &[String]) -> Option<String> {
    if phrases.is_empty() {
        return None;
    }
    let set = RegexSetBuilder::new(phrases.iter().map(|p| regex::escape(p)))
        .case_insensitive(true)
        .build()
        .ok()?;
    set.matches(content)
        .iter()
        .next()
        .map(|i| phrases[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, content: &str) -> TransportResponse {
        TransportResponse {
            status,
            final_url: "https://shop.example.com/p/1".into(),
            content: content.into(),
            elapsed_ms: 100,
            retry_after_secs: None,
            cookies: Vec::new(),
        }
    }

    fn profile() -> DomainProfile {
        DomainProfile::new("shop.example.com")
    }

    fn classify_default(r: &TransportResponse) -> Option<SoftFailure> {
        classify(r, &profile(), Tier::Direct, &RouterConfig::default())
    }

    /// A body long enough to clear the placeholder threshold.
    fn long_article(extra: &str) -> String {
        format!(
            "<html><body><article>{} {}</article></body></html>",
            "A dry gin with juniper, coriander seed and a long citrus finish. ".repeat(80),
            extra
        )
    }

    #[test]
    fn test_blocking_statuses_win_over_content() {
        let ok_body = long_article("");
        assert_eq!(
            classify_default(&resp(403, &ok_body)),
            Some(SoftFailure::BlockedStatus { status: 403 })
        );
        assert_eq!(
            classify_default(&resp(429, &ok_body)),
            Some(SoftFailure::BlockedStatus { status: 429 })
        );
    }

    #[test]
    fn test_challenge_page_detected() {
        let body = long_article(r#"<script src="/cdn-cgi/challenge-platform/h/b.js"></script>"#);
        match classify_default(&resp(200, &body)) {
            Some(SoftFailure::Challenge { signature }) => {
                assert!(signature.starts_with("cloudflare:"))
            }
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn test_captcha_detected() {
        let body = long_article(r#"<div class="g-recaptcha" data-sitekey="x"></div>"#);
        assert!(matches!(
            classify_default(&resp(200, &body)),
            Some(SoftFailure::Captcha { .. })
        ));
    }

    #[test]
    fn test_js_placeholder_short_body_no_visible_text() {
        let body = r#"<html><body><div id="root"></div><script>boot()</script></body></html>"#;
        assert!(matches!(
            classify_default(&resp(200, body)),
            Some(SoftFailure::JsPlaceholder { .. })
        ));
    }

    #[test]
    fn test_short_body_with_text_is_age_gated() {
        // 200 characters of ordinary text, no keyword: still under the
        // threshold, so treated as an age-gate candidate.
        let body = "Welcome to our store. ".repeat(9);
        assert!(body.len() < 500);
        assert_eq!(
            classify_default(&resp(200, &body)),
            Some(SoftFailure::AgeGated { matched_phrase: None })
        );
    }

    #[test]
    fn test_long_body_with_age_phrase_is_age_gated() {
        let body = long_article("Are you 21 or older?");
        assert!(body.len() > 5_000);
        match classify_default(&resp(200, &body)) {
            Some(SoftFailure::AgeGated { matched_phrase: Some(p) }) => {
                assert_eq!(p.to_lowercase(), "are you 21")
            }
            other => panic!("expected age gate, got {other:?}"),
        }
    }

    #[test]
    fn test_age_phrase_matching_is_case_insensitive() {
        let body = long_article("LEGAL DRINKING AGE required beyond this point");
        assert!(matches!(
            classify_default(&resp(200, &body)),
            Some(SoftFailure::AgeGated { matched_phrase: Some(_) })
        ));
    }

    #[test]
    fn test_clean_long_body_passes() {
        let body = long_article("");
        assert_eq!(classify_default(&resp(200, &body)), None);
    }

    #[test]
    fn test_low_historical_success_forces_escalation() {
        let cfg = RouterConfig::default();
        let p = profile().with_success_rate(Tier::Direct, 0.1);
        let body = long_article("");
        match classify(&resp(200, &body), &p, Tier::Direct, &cfg) {
            Some(SoftFailure::LowHistoricalSuccess { rate }) => assert!((rate - 0.1).abs() < 1e-9),
            other => panic!("expected learned trigger, got {other:?}"),
        }
        // Other tiers judged by their own rate.
        assert_eq!(classify(&resp(200, &body), &p, Tier::Browser, &cfg), None);
    }

    #[test]
    fn test_visible_text_ignores_scripts_and_styles() {
        let html = r#"<html><head><style>.a{color:red}</style></head>
            <body><script>var x = "lots of invisible text here";</script></body></html>"#;
        assert_eq!(visible_text_len(html), 0);

        let html_with_text = "<html><body><p>Tasting notes</p></body></html>";
        assert!(visible_text_len(html_with_text) > 0);
    }
}
