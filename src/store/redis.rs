//! Redis-backed profile store for distributed multi-worker coordination.
//!
//! Uses Redis key TTLs for automatic expiration of stale domain state.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::models::{DomainCookie, DomainProfile};

use super::{ProfileStore, StoreError, StoreResult};

/// Key prefix for profile data in Redis.
const KEY_PREFIX: &str = "vintry:profile:";
/// Key prefix for cookie hints.
const COOKIE_PREFIX: &str = "vintry:cookies:";

pub struct RedisProfileStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisProfileStore {
    /// Connect to Redis. `ttl` bounds how long inactive domain state lives.
    pub async fn new(redis_url: &str, ttl: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Backend(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn profile_key(domain: &str) -> String {
        format!("{}{}", KEY_PREFIX, domain)
    }

    fn cookie_key(domain: &str) -> String {
        format!("{}{}", COOKIE_PREFIX, domain)
    }
}

#[async_trait]
impl ProfileStore for RedisProfileStore {
    async fn get(&self, domain: &str) -> StoreResult<DomainProfile> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(Self::profile_key(domain))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match json {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Serde(e.to_string()))
            }
            None => Ok(DomainProfile::new(domain)),
        }
    }

    async fn put(&self, profile: &DomainProfile) -> StoreResult<()> {
        let json =
            serde_json::to_string(profile).map_err(|e| StoreError::Serde(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::profile_key(&profile.domain), json, self.ttl_secs)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn cookies(&self, domain: &str) -> StoreResult<Vec<DomainCookie>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(Self::cookie_key(domain))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match json {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Serde(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn put_cookies(&self, domain: &str, cookies: &[DomainCookie]) -> StoreResult<()> {
        let json = serde_json::to_string(cookies).map_err(|e| StoreError::Serde(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::cookie_key(domain), json, self.ttl_secs)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn domains(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", KEY_PREFIX);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut domains: Vec<String> = keys
            .iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect();
        domains.sort();
        Ok(domains)
    }
}

impl Clone for RedisProfileStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            ttl_secs: self.ttl_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            RedisProfileStore::profile_key("shop.example.com"),
            "vintry:profile:shop.example.com"
        );
        assert_eq!(
            RedisProfileStore::cookie_key("shop.example.com"),
            "vintry:cookies:shop.example.com"
        );
    }
}
