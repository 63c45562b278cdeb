//! Consecutive-failure tracking for operational alerting.
//!
//! Feeds alerts only; it never influences tier selection or escalation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct FailureMonitor {
    threshold: u32,
    counts: Arc<RwLock<HashMap<String, u32>>>,
}

impl FailureMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Any success resets the domain's streak.
    pub async fn record_success(&self, domain: &str) {
        let mut counts = self.counts.write().await;
        counts.remove(domain);
    }

    /// Record a failed logical fetch. Returns the streak length when it has
    /// reached the alert threshold.
    pub async fn record_failure(&self, domain: &str) -> Option<u32> {
        let mut counts = self.counts.write().await;
        let count = counts.entry(domain.to_string()).or_insert(0);
        *count += 1;
        (*count >= self.threshold).then_some(*count)
    }

    /// Current streak for a domain.
    pub async fn consecutive_failures(&self, domain: &str) -> u32 {
        let counts = self.counts.read().await;
        counts.get(domain).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alert_fires_at_threshold() {
        let monitor = FailureMonitor::new(3);
        assert_eq!(monitor.record_failure("shop.example.com").await, None);
        assert_eq!(monitor.record_failure("shop.example.com").await, None);
        assert_eq!(monitor.record_failure("shop.example.com").await, Some(3));
        // Streak keeps alerting until a success clears it.
        assert_eq!(monitor.record_failure("shop.example.com").await, Some(4));
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let monitor = FailureMonitor::new(3);
        monitor.record_failure("shop.example.com").await;
        monitor.record_failure("shop.example.com").await;
        monitor.record_success("shop.example.com").await;
        assert_eq!(monitor.consecutive_failures("shop.example.com").await, 0);
        assert_eq!(monitor.record_failure("shop.example.com").await, None);
    }

    #[tokio::test]
    async fn test_streaks_are_per_domain() {
        let monitor = FailureMonitor::new(2);
        monitor.record_failure("a.example.com").await;
        assert_eq!(monitor.record_failure("b.example.com").await, None);
        assert_eq!(monitor.record_failure("a.example.com").await, Some(2));
    }
}
