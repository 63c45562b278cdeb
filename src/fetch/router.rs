//! The router: one logical fetch, escalating through tiers.
//!
//! For each requested URL the router reads the domain's learned profile,
//! picks the cheapest starting tier, and loops attempt-by-attempt: compute
//! a timeout, run the tier fetcher under cancellation, classify the
//! response, fold the outcome back into the profile, and either finish or
//! escalate. Feedback is written after every attempt, never during one, so
//! cancelling an in-flight fetch (dropping its future) aborts the active
//! tier call without leaving a misleading profile update behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{RouterConfig, Settings};
use crate::ledger::{FetchLedger, LogLedger};
use crate::models::{
    CostRecord, DomainProfile, FailureRecord, FetchAttempt, FetchHints, FetchResult, SoftFailure,
    Tier, TransportError, TransportResponse,
};
use crate::store::{open_store, MemoryProfileStore, ProfileStore};

use super::{
    classifier, decide, escalation::Decision, extract_domain, feedback, select_starting_tier,
    timeout_for, AttemptOutcome, BrowserFetcher, DirectFetcher, DomainContext, FailureMonitor,
    Pacer, RenderApiFetcher, TierFetcher,
};

pub struct Router {
    fetchers: Vec<Arc<dyn TierFetcher>>,
    store: Arc<dyn ProfileStore>,
    ledger: Arc<dyn FetchLedger>,
    cfg: RouterConfig,
    pacer: Pacer,
    monitor: FailureMonitor,
    /// Ephemeral profiles used while the shared store is unreachable.
    fallback: MemoryProfileStore,
}

impl Router {
    /// Build a router from explicit dependencies. Fetchers are matched to
    /// tiers by their own `tier()`; tests substitute scripted fakes here.
    pub fn new(
        fetchers: Vec<Arc<dyn TierFetcher>>,
        store: Arc<dyn ProfileStore>,
        cfg: RouterConfig,
    ) -> Self {
        let pacer = Pacer::new(
            Duration::from_millis(cfg.pace_min_ms),
            Duration::from_millis(cfg.pace_max_ms),
        );
        let monitor = FailureMonitor::new(cfg.failure_alert_threshold);
        let fallback = MemoryProfileStore::new(Duration::from_secs(cfg.profile_ttl_days * 86_400));

        Self {
            fetchers,
            store,
            ledger: Arc::new(LogLedger),
            cfg,
            pacer,
            monitor,
            fallback,
        }
    }

    /// Build a router with the real tier stack from settings.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ttl = Duration::from_secs(settings.router.profile_ttl_days * 86_400);
        let store = open_store(settings.profile_store.as_deref(), ttl, &settings.data_dir).await?;

        let mut fetchers: Vec<Arc<dyn TierFetcher>> = vec![
            Arc::new(DirectFetcher::new(
                settings.user_agent.clone(),
                settings.router.direct_max_retries,
            )),
            Arc::new(BrowserFetcher::new(
                settings.browser.clone(),
                settings.router.age_gate_buttons.clone(),
            )),
        ];
        if let Some(ref url) = settings.render_api_url {
            fetchers.push(Arc::new(RenderApiFetcher::new(
                url,
                settings.render_api_token.as_deref(),
                settings.router.render_cost_units,
            )));
        } else {
            info!("No render API configured; Tier 3 escalations will fail over to exhaustion");
        }

        Ok(Self::new(fetchers, store, settings.router.clone()))
    }

    /// Replace the outbound record sink.
    pub fn with_ledger(mut self, ledger: Arc<dyn FetchLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// The shared profile store this router writes to.
    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    fn fetcher_for(&self, tier: Tier) -> Option<&Arc<dyn TierFetcher>> {
        self.fetchers.iter().find(|f| f.tier() == tier)
    }

    /// Fetch one URL, escalating through tiers as needed. Never panics and
    /// never returns an error: exhaustion is a failed `FetchResult` carrying
    /// the full attempt history.
    pub async fn fetch(&self, url: &str, hints: FetchHints) -> FetchResult {
        let overall_start = Instant::now();

        let Some(domain) = extract_domain(url) else {
            warn!(url, "Cannot extract a domain; refusing to fetch");
            return FetchResult {
                url: url.to_string(),
                succeeded: false,
                content: None,
                final_url: None,
                final_tier: None,
                attempts: Vec::new(),
                total_elapsed_ms: 0,
            };
        };

        let mut profile = self.load_profile(&domain).await;
        let cookies = match self.store.cookies(&domain).await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(%domain, error = %e, "Cookie hints unavailable");
                Vec::new()
            }
        };
        let ctx = DomainContext {
            domain: domain.clone(),
            cookies,
            product_type_hint: hints.product_type_hint.clone(),
        };

        let mut tier = match hints.force_tier {
            Some(forced) => forced,
            None => select_starting_tier(&profile, &self.cfg, Utc::now()),
        };
        debug!(url, %domain, starting_tier = %tier, "Routing fetch");

        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut winning: Option<TransportResponse> = None;

        for attempt_index in 0u32.. {
            self.pacer.pace(&domain).await;

            let timeout = timeout_for(&profile, attempt_index, &self.cfg);
            let started_at = Utc::now();
            let started = Instant::now();

            let transport = self.run_tier(tier, url, timeout, &ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let timed_out = matches!(transport, Err(TransportError::Timeout(_)));
            let (status, soft_failure, error_text, response) = match transport {
                Ok(resp) => {
                    let soft = classifier::classify(&resp, &profile, tier, &self.cfg);
                    (resp.status, soft, None, Some(resp))
                }
                Err(e) => (0, None, Some(e.to_string()), None),
            };
            let transport_ok = response.is_some();
            let success = transport_ok && soft_failure.is_none();

            let outcome = AttemptOutcome {
                tier,
                success,
                elapsed_ms,
                timed_out,
                soft_failure: soft_failure.clone(),
                at: started_at,
            };
            profile = feedback::record(&profile, &outcome, &self.cfg);

            // A domain that only yields at the paid tier trips the sticky
            // circuit breaker; the selector honors it until expiry.
            if success && tier == Tier::RenderApi && !profile.requires_tier3 {
                profile.requires_tier3 = true;
                profile.requires_tier3_since = Some(started_at);
                info!(%domain, "Domain now routes straight to the paid tier");
            }

            self.save_profile(&profile).await;

            if success {
                if let Some(ref resp) = response {
                    if !resp.cookies.is_empty() {
                        self.persist_cookies(&domain, resp).await;
                    }
                }
            }

            attempts.push(FetchAttempt {
                tier,
                timeout_ms: timeout.as_millis() as u64,
                started_at,
                elapsed_ms,
                status: transport_ok.then_some(status),
                error: error_text.clone(),
                soft_failure: soft_failure.clone(),
            });

            match decide(tier, transport_ok, soft_failure.as_ref()) {
                Decision::Succeed => {
                    winning = response;
                    break;
                }
                Decision::Escalate(next) => {
                    self.emit_failure(&domain, url, tier, &soft_failure, error_text, &response);
                    debug!(url, from = %tier, to = %next, "Escalating");
                    tier = next;
                }
                Decision::Fail => {
                    self.emit_failure(&domain, url, tier, &soft_failure, error_text, &response);
                    break;
                }
            }
        }

        let succeeded = winning.is_some();
        if succeeded {
            self.monitor.record_success(&domain).await;
        } else if let Some(streak) = self.monitor.record_failure(&domain).await {
            self.ledger.alert(&domain, streak);
        }

        let final_tier = attempts.last().map(|a| a.tier);
        let result = FetchResult {
            url: url.to_string(),
            succeeded,
            content: winning.as_ref().map(|r| r.content.clone()),
            final_url: winning.as_ref().map(|r| r.final_url.clone()),
            final_tier,
            attempts,
            total_elapsed_ms: overall_start.elapsed().as_millis() as u64,
        };

        if let (true, Some(tier)) = (succeeded, final_tier) {
            info!(
                url,
                %tier,
                elapsed_ms = result.total_elapsed_ms,
                "Fetch succeeded"
            );
        } else {
            warn!(
                url,
                attempts = result.attempts.len(),
                elapsed_ms = result.total_elapsed_ms,
                "Fetch exhausted all tiers"
            );
        }

        result
    }

    /// Run one tier under cancellation. A missing fetcher (e.g. no render
    /// API configured) reads as an unavailable transport so the escalation
    /// policy can account for the attempt honestly.
    async fn run_tier(
        &self,
        tier: Tier,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        let Some(fetcher) = self.fetcher_for(tier) else {
            return Err(TransportError::Unavailable(format!(
                "no fetcher registered for tier {tier}"
            )));
        };

        if fetcher.cost_units() > 0.0 {
            self.ledger.record_cost(&CostRecord {
                domain: ctx.domain.clone(),
                url: url.to_string(),
                tier,
                cost_units: fetcher.cost_units(),
                at: Utc::now(),
            });
        }

        match tokio::time::timeout(timeout, fetcher.fetch(url, timeout, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn load_profile(&self, domain: &str) -> DomainProfile {
        match self.store.get(domain).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(domain, error = %e, "Profile store unreachable, using ephemeral profile");
                self.fallback
                    .get(domain)
                    .await
                    .unwrap_or_else(|_| DomainProfile::new(domain))
            }
        }
    }

    async fn save_profile(&self, profile: &DomainProfile) {
        if let Err(e) = self.store.put(profile).await {
            warn!(
                domain = %profile.domain,
                error = %e,
                "Profile store unreachable, keeping feedback in memory"
            );
            let _ = self.fallback.put(profile).await;
        }
    }

    async fn persist_cookies(&self, domain: &str, resp: &TransportResponse) {
        // Session cookies earned by the browser tier (age-gate bypass in
        // particular) let the direct tier skip the interstitial next time.
        match self.store.put_cookies(domain, &resp.cookies).await {
            Ok(()) => debug!(domain, count = resp.cookies.len(), "Persisted session cookies"),
            Err(e) => warn!(domain, error = %e, "Could not persist session cookies"),
        }
    }

    fn emit_failure(
        &self,
        domain: &str,
        url: &str,
        tier: Tier,
        soft_failure: &Option<SoftFailure>,
        error_text: Option<String>,
        response: &Option<TransportResponse>,
    ) {
        let reason = soft_failure
            .as_ref()
            .map(|s| s.reason().to_string())
            .or(error_text)
            .unwrap_or_else(|| "unknown".to_string());

        self.ledger.record_failure(&FailureRecord {
            domain: domain.to_string(),
            url: url.to_string(),
            tier,
            reason,
            status: response.as_ref().map(|r| r.status),
            retry_after_secs: response.as_ref().and_then(|r| r.retry_after_secs),
            at: Utc::now(),
        });
    }
}
