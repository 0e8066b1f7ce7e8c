//! Embedded SQLite key-value backend
//!
//! Each artifact is a single row keyed by its cache key. Single-row upserts
//! are atomic, and `synchronous=FULL` makes them durable on commit.

use crate::error::{Result, StoreError};
use crate::key::CacheKey;
use crate::store::BlobStore;
use crate::types::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!(path = ?path, "SQLite store initialized");
        Ok(store)
    }

    /// A private database that lives as long as the store
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                key TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL,
                modified_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS artifacts_modified_at ON artifacts (modified_at)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn contains(&self, key: &CacheKey) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE key = ?1")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar("SELECT data FROM artifacts WHERE key = ?1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match data {
            Some(data) if data.is_empty() => {
                Err(StoreError::Corrupt(format!("empty artifact row {}", key)))
            }
            other => Ok(other),
        }
    }

    async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO artifacts (key, data, modified_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET data = excluded.data, modified_at = excluded.modified_at
            "#,
        )
        .bind(key.as_str())
        .bind(data)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, size = data.len(), "Wrote artifact row");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let result = sqlx::query("DELETE FROM artifacts WHERE key = ?1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let rows: Vec<(String, i64, i64)> =
            sqlx::query_as("SELECT key, modified_at, length(data) FROM artifacts")
                .fetch_all(&self.pool)
                .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, modified_at, size) in rows {
            let Some(key) = CacheKey::parse(&key) else {
                warn!(key = %key, "Skipping row with malformed key");
                continue;
            };
            let modified_at =
                DateTime::<Utc>::from_timestamp_millis(modified_at).unwrap_or_default();
            entries.push(CacheEntry {
                key,
                size: size.max(0) as u64,
                modified_at,
            });
        }
        Ok(entries)
    }

    async fn purge_all(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM artifacts")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM artifacts WHERE modified_at < ?1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
