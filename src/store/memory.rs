//! In-memory profile store with TTL expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{DomainCookie, DomainProfile};

use super::{ProfileStore, StoreResult};

/// Process-local store. The default for tests, and the router's degraded
/// mode when a shared store is unreachable.
#[derive(Debug, Clone)]
pub struct MemoryProfileStore {
    ttl: Duration,
    profiles: Arc<RwLock<HashMap<String, (DomainProfile, Instant)>>>,
    cookies: Arc<RwLock<HashMap<String, (Vec<DomainCookie>, Instant)>>>,
}

impl MemoryProfileStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            profiles: Arc::new(RwLock::new(HashMap::new())),
            cookies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn live<T: Clone>(&self, entry: Option<&(T, Instant)>) -> Option<T> {
        entry.and_then(|(value, written)| (written.elapsed() < self.ttl).then(|| value.clone()))
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, domain: &str) -> StoreResult<DomainProfile> {
        let profiles = self.profiles.read().await;
        Ok(self
            .live(profiles.get(domain))
            .unwrap_or_else(|| DomainProfile::new(domain)))
    }

    async fn put(&self, profile: &DomainProfile) -> StoreResult<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.domain.clone(), (profile.clone(), Instant::now()));
        Ok(())
    }

    async fn cookies(&self, domain: &str) -> StoreResult<Vec<DomainCookie>> {
        let cookies = self.cookies.read().await;
        Ok(self.live(cookies.get(domain)).unwrap_or_default())
    }

    async fn put_cookies(&self, domain: &str, cookies: &[DomainCookie]) -> StoreResult<()> {
        let mut map = self.cookies.write().await;
        map.insert(domain.to_string(), (cookies.to_vec(), Instant::now()));
        Ok(())
    }

    async fn domains(&self) -> StoreResult<Vec<String>> {
        let profiles = self.profiles.read().await;
        let mut live: Vec<String> = profiles
            .iter()
            .filter(|(_, (_, written))| written.elapsed() < self.ttl)
            .map(|(domain, _)| domain.clone())
            .collect();
        live.sort();
        Ok(live)
    }
}
