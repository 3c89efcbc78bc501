//! Persistent chunk cache
//!
//! Maps a [`ChunkKey`] to the oracle outcome for that chunk. Entries are never
//! evicted, so reruns over the same source and parameters skip the oracle entirely.
//!
//! Failure policy: lookup errors degrade to a miss, write errors are logged and
//! dropped. Neither aborts a run.

use crate::types::{ChunkKey, OracleMatch};
use setscan_common::{time, Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Cached outcome of one chunk: `Some` match fields, or `None` for "no match"
pub type CachedPayload = Option<OracleMatch>;

/// SQLite-backed chunk cache
///
/// Cloning is cheap (shares the pool). Every write is a single upsert
/// statement, so an interrupted run never leaves a half-written entry.
#[derive(Clone)]
pub struct ChunkCache {
    db: SqlitePool,
}

impl ChunkCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (or create) the cache database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = super::init_database_pool(path).await?;
        Ok(Self::new(pool))
    }

    /// Look up a chunk
    ///
    /// # Returns
    /// * `Ok(None)` - chunk never processed (or stored payload unreadable)
    /// * `Ok(Some(None))` - cached "no match"
    /// * `Ok(Some(Some(m)))` - cached match fields
    pub async fn lookup(&self, key: &ChunkKey) -> Result<Option<CachedPayload>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT payload FROM chunk_cache WHERE chunk_key = ?")
                .bind(key.as_str())
                .fetch_optional(&self.db)
                .await?;

        let Some((payload,)) = row else {
            return Ok(None);
        };

        match payload {
            None => Ok(Some(None)),
            Some(json) => match serde_json::from_str::<OracleMatch>(&json) {
                Ok(matched) => Ok(Some(Some(matched))),
                Err(e) => {
                    tracing::warn!(
                        chunk_key = %key,
                        error = %e,
                        "Unreadable cache payload, treating as miss"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Fail-open lookup: storage errors are logged and reported as a miss
    pub async fn get(&self, key: &ChunkKey) -> Option<CachedPayload> {
        match self.lookup(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(chunk_key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Insert or replace a chunk entry (last write wins)
    pub async fn store(&self, key: &ChunkKey, payload: &CachedPayload) -> Result<()> {
        let json = payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Serialize cache payload failed: {}", e)))?;

        sqlx::query(
            "INSERT INTO chunk_cache (chunk_key, created_utc, payload) VALUES (?, ?, ?)
             ON CONFLICT(chunk_key) DO UPDATE SET
                created_utc = excluded.created_utc,
                payload = excluded.payload",
        )
        .bind(key.as_str())
        .bind(time::unix_seconds())
        .bind(json)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Best-effort write: a lost cache entry only costs a repeat oracle call later
    pub async fn put(&self, key: &ChunkKey, payload: &CachedPayload) {
        if let Err(e) = self.store(key, payload).await {
            tracing::warn!(chunk_key = %key, error = %e, "Cache write failed, continuing");
        }
    }

    /// Number of cached chunks
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_cache")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Write a consistent copy of the cache database to `dest`
    ///
    /// Uses `VACUUM INTO`, which includes pages still sitting in the WAL.
    pub async fn snapshot_to(&self, dest: &Path) -> Result<()> {
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        let dest_str = dest
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("Non UTF-8 path: {}", dest.display())))?;

        sqlx::query("VACUUM INTO ?")
            .bind(dest_str)
            .execute(&self.db)
            .await?;

        tracing::debug!(dest = %dest.display(), "Cache snapshot written");
        Ok(())
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.db.close().await;
    }
}
