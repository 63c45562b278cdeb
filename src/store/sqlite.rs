//! SQLite-backed profile store for single-host multi-process sharing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::models::{DomainCookie, DomainProfile};

use super::{ProfileStore, StoreError, StoreResult};

/// Profiles and cookie hints as JSON rows keyed by domain, with an
/// `updated_at` column doing TTL duty. WAL mode keeps concurrent workers
/// from tripping over each other; there is still no cross-row transaction,
/// which the feedback fold tolerates by design.
pub struct SqliteProfileStore {
    db_path: PathBuf,
    ttl: Duration,
}

impl SqliteProfileStore {
    pub fn new(db_path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            ttl,
        }
    }

    /// Open a connection with proper concurrency settings.
    fn open_db(db_path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
        "#,
        )?;
        Self::init_tables(&conn)?;
        Ok(conn)
    }

    fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS domain_profiles (
                domain TEXT PRIMARY KEY,
                profile TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS domain_cookies (
                domain TEXT PRIMARY KEY,
                cookies TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
        )
    }

    fn conn(&self) -> StoreResult<Connection> {
        Self::open_db(&self.db_path).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn now_secs() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn cutoff_secs(&self) -> i64 {
        Self::now_secs() - self.ttl.as_secs() as i64
    }

    /// Drop rows past the retention window. Called opportunistically on
    /// writes, mirroring how the TTL would behave in a real KV store.
    fn sweep(&self, conn: &Connection) {
        let cutoff = self.cutoff_secs();
        let swept = conn
            .execute("DELETE FROM domain_profiles WHERE updated_at <= ?", params![cutoff])
            .unwrap_or(0)
            + conn
                .execute("DELETE FROM domain_cookies WHERE updated_at <= ?", params![cutoff])
                .unwrap_or(0);
        if swept > 0 {
            debug!("Swept {} expired profile store rows", swept);
        }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get(&self, domain: &str) -> StoreResult<DomainProfile> {
        let conn = self.conn()?;
        let row: Option<String> = conn
            .query_row(
                "SELECT profile FROM domain_profiles WHERE domain = ? AND updated_at > ?",
                params![domain, self.cutoff_secs()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Backend(other.to_string())),
            })?;

        match row {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Serde(e.to_string()))
            }
            None => Ok(DomainProfile::new(domain)),
        }
    }

    async fn put(&self, profile: &DomainProfile) -> StoreResult<()> {
        let json =
            serde_json::to_string(profile).map_err(|e| StoreError::Serde(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO domain_profiles (domain, profile, updated_at)
               VALUES (?, ?, ?)"#,
            params![profile.domain, json, Self::now_secs()],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.sweep(&conn);
        Ok(())
    }

    async fn cookies(&self, domain: &str) -> StoreResult<Vec<DomainCookie>> {
        let conn = self.conn()?;
        let row: Option<String> = conn
            .query_row(
                "SELECT cookies FROM domain_cookies WHERE domain = ? AND updated_at > ?",
                params![domain, self.cutoff_secs()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Backend(other.to_string())),
            })?;

        match row {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StoreError::Serde(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn put_cookies(&self, domain: &str, cookies: &[DomainCookie]) -> StoreResult<()> {
        let json = serde_json::to_string(cookies).map_err(|e| StoreError::Serde(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO domain_cookies (domain, cookies, updated_at)
               VALUES (?, ?, ?)"#,
            params![domain, json, Self::now_secs()],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn domains(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT domain FROM domain_profiles WHERE updated_at > ? ORDER BY domain",
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![self.cutoff_secs()], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut domains = Vec::new();
        for row in rows {
            domains.push(row.map_err(|e| StoreError::Backend(e.to_string()))?);
        }
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(ttl: Duration) -> (tempfile::TempDir, SqliteProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteProfileStore::new(dir.path().join("profiles.db"), ttl);
        (dir, store)
    }

    #[tokio::test]
    async fn test_miss_returns_default_profile() {
        let (_dir, store) = temp_store(Duration::from_secs(60));
        let profile = store.get("shop.example.com").await.unwrap();
        assert_eq!(profile.domain, "shop.example.com");
        assert_eq!(profile.sample_count, 0);
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let (_dir, store) = temp_store(Duration::from_secs(60));
        let mut profile = DomainProfile::new("shop.example.com");
        profile.tier2_success_rate = 0.4;
        profile.likely_bot_protected = true;
        store.put(&profile).await.unwrap();

        let loaded = store.get("shop.example.com").await.unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(store.domains().await.unwrap(), vec!["shop.example.com"]);
    }

    #[tokio::test]
    async fn test_expired_rows_read_as_defaults() {
        let (_dir, store) = temp_store(Duration::from_secs(0));
        let mut profile = DomainProfile::new("shop.example.com");
        profile.sample_count = 12;
        store.put(&profile).await.unwrap();

        let loaded = store.get("shop.example.com").await.unwrap();
        assert_eq!(loaded.sample_count, 0);
    }

    #[tokio::test]
    async fn test_cookie_hints_round_trip() {
        let (_dir, store) = temp_store(Duration::from_secs(60));
        let cookies = vec![DomainCookie {
            name: "age_verified".into(),
            value: "1".into(),
            domain: "shop.example.com".into(),
            path: "/".into(),
            secure: true,
            http_only: false,
        }];
        store.put_cookies("shop.example.com", &cookies).await.unwrap();
        assert_eq!(store.cookies("shop.example.com").await.unwrap(), cookies);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.db");

        {
            let store = SqliteProfileStore::new(&path, Duration::from_secs(60));
            let mut profile = DomainProfile::new("shop.example.com");
            profile.requires_tier3 = true;
            store.put(&profile).await.unwrap();
        }

        let reopened = SqliteProfileStore::new(&path, Duration::from_secs(60));
        let loaded = reopened.get("shop.example.com").await.unwrap();
        assert!(loaded.requires_tier3);
    }
}
