//! Domain profile store: shared, TTL-bounded key-value persistence for
//! learned domain behavior and cookie hints.
//!
//! Any backend satisfying "read returns default on miss, write refreshes
//! TTL, no cross-key transaction" is sufficient. The EMA feedback update is
//! a pure fold, so concurrent read-modify-write races lose convergence
//! speed, never correctness.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;
mod sqlite;

pub use memory::MemoryProfileStore;
#[cfg(feature = "redis-backend")]
pub use redis::RedisProfileStore;
pub use sqlite::SqliteProfileStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DomainCookie, DomainProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profile for a domain. Returns a fresh default profile on miss or on
    /// an expired record; never errors for a missing key.
    async fn get(&self, domain: &str) -> StoreResult<DomainProfile>;

    /// Upsert a profile, refreshing its TTL.
    async fn put(&self, profile: &DomainProfile) -> StoreResult<()>;

    /// Cookie hints for a domain (empty on miss).
    async fn cookies(&self, domain: &str) -> StoreResult<Vec<DomainCookie>>;

    /// Replace a domain's cookie hints, refreshing their TTL.
    async fn put_cookies(&self, domain: &str, cookies: &[DomainCookie]) -> StoreResult<()>;

    /// Domains with live (unexpired) profiles, for inspection tooling.
    async fn domains(&self) -> StoreResult<Vec<String>>;
}

/// Open a profile store from its configured URL.
///
/// - `None` → sqlite database in the data directory
/// - `"memory"` → process-local, non-persistent
/// - `"sqlite"` → sqlite database in the data directory
/// - `"redis://..."` → shared Redis (requires the `redis-backend` feature)
pub async fn open_store(
    spec: Option<&str>,
    ttl: Duration,
    data_dir: &Path,
) -> anyhow::Result<Arc<dyn ProfileStore>> {
    match spec {
        None | Some("sqlite") => {
            let path = data_dir.join(crate::config::DEFAULT_DATABASE_FILENAME);
            Ok(Arc::new(SqliteProfileStore::new(path, ttl)))
        }
        Some("memory") => Ok(Arc::new(MemoryProfileStore::new(ttl))),
        #[cfg(feature = "redis-backend")]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            let store = RedisProfileStore::new(url, ttl).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-backend"))]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            anyhow::bail!(
                "Profile store '{url}' requires a build with the 'redis-backend' feature"
            )
        }
        Some(other) => anyhow::bail!("Unknown profile store '{other}'"),
    }
}
