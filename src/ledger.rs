//! Outbound record sinks: cost units, failure records, operational alerts.
//!
//! The router is a library component; external collaborators (cost ledger,
//! error logging, alerting) receive records through this trait. The default
//! implementation emits structured tracing events.

use tracing::{error, info, warn};

use crate::models::{CostRecord, FailureRecord};

pub trait FetchLedger: Send + Sync {
    /// One paid-tier call happened.
    fn record_cost(&self, record: &CostRecord);

    /// One attempt failed (transport error or soft-failure classification).
    fn record_failure(&self, record: &FailureRecord);

    /// A domain crossed the consecutive-failure alert threshold.
    fn alert(&self, domain: &str, consecutive_failures: u32);
}

/// Default ledger: structured log events only.
#[derive(Debug, Default, Clone)]
pub struct LogLedger;

impl FetchLedger for LogLedger {
    fn record_cost(&self, record: &CostRecord) {
        info!(
            domain = %record.domain,
            url = %record.url,
            tier = %record.tier,
            cost_units = record.cost_units,
            "Paid fetch cost recorded"
        );
    }

    fn record_failure(&self, record: &FailureRecord) {
        warn!(
            domain = %record.domain,
            url = %record.url,
            tier = %record.tier,
            reason = %record.reason,
            status = ?record.status,
            "Fetch attempt failed"
        );
    }

    fn alert(&self, domain: &str, consecutive_failures: u32) {
        error!(
            domain,
            consecutive_failures, "Domain failing repeatedly, needs attention"
        );
    }
}

/// Ledger that drops everything. Useful in tests.
#[derive(Debug, Default, Clone)]
pub struct NoopLedger;

impl FetchLedger for NoopLedger {
    fn record_cost(&self, _record: &CostRecord) {}
    fn record_failure(&self, _record: &FailureRecord) {}
    fn alert(&self, _domain: &str, _consecutive_failures: u32) {}
}
