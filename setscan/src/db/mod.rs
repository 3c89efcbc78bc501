//! Database access for setscan
//!
//! The chunk cache lives in its own SQLite file that persists across runs.

pub mod chunk_cache;

pub use chunk_cache::ChunkCache;

use setscan_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Concurrent writers wait this long for the write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize the cache database connection pool
///
/// Creates the parent directory and the file if missing. WAL journaling lets
/// readers proceed while a chunk task writes.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!(path = %db_path.display(), "Connecting to cache database");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the chunk cache table if it does not exist
///
/// `payload` is NULL for a cached "no match"; a missing row means "never processed".
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_cache (
            chunk_key TEXT PRIMARY KEY,
            created_utc INTEGER NOT NULL,
            payload TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (chunk_cache)");

    Ok(())
}
