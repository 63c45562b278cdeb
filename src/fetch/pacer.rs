//! Per-domain politeness pacing.
//!
//! A small random delay between successive attempts to the same domain,
//! shared across concurrent logical fetches. This sits above the tier
//! escalation loop; it is rate-limit hygiene, not fetch strategy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Pacer {
    min_delay: Duration,
    max_delay: Duration,
    last_attempt: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Pacer {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_attempt: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wait until this domain is polite to hit again, then stamp it.
    ///
    /// The required gap is drawn fresh per call from [min, max] so bursts
    /// against one domain do not fall into a lockstep cadence.
    pub async fn pace(&self, domain: &str) {
        let gap = self.random_gap();

        let wait = {
            let last = self.last_attempt.read().await;
            last.get(domain).and_then(|t| gap.checked_sub(t.elapsed()))
        };

        if let Some(wait) = wait {
            if !wait.is_zero() {
                debug!("Pacing {}: waiting {:?}", domain, wait);
                tokio::time::sleep(wait).await;
            }
        }

        let mut last = self.last_attempt.write().await;
        last.insert(domain.to_string(), Instant::now());
    }

    fn random_gap(&self) -> Duration {
        if self.max_delay == self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_is_immediate() {
        let pacer = Pacer::new(Duration::from_millis(50), Duration::from_millis(120));
        let start = Instant::now();
        pacer.pace("shop.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_back_to_back_attempts_are_spaced() {
        let pacer = Pacer::new(Duration::from_millis(50), Duration::from_millis(120));
        pacer.pace("shop.example.com").await;

        let start = Instant::now();
        pacer.pace("shop.example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_different_domains_do_not_block_each_other() {
        let pacer = Pacer::new(Duration::from_millis(50), Duration::from_millis(120));
        pacer.pace("a.example.com").await;

        let start = Instant::now();
        pacer.pace("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }
}
