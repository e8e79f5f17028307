//! Persistent extraction-result cache.
//!
//! Results are stored per upstream message ID in a SQLite file, serialized with
//! bincode, together with their creation time in unix milliseconds.
//!
//! ## Concurrency
//!
//! Reads go through a small reader pool; all writes go through a single writer
//! connection, so concurrent `set` calls queue on the pool instead of fighting
//! over the database lock. WAL mode lets readers proceed while a write is in
//! flight.
//!
//! ## Expiry
//!
//! `get` treats rows older than the TTL as absent without deleting them.
//! [`MessageCache::purge_expired`] removes them, and [`MessageCache::spawn_sweeper`]
//! runs it periodically.

use crate::models::CachedResult;
use chrono::{DateTime, Utc};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const READER_CONNECTIONS: u32 = 4;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("failed to create cache directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize cached result: {0}")]
    Serialize(String),
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CacheStats {
    pub count: i64,
    pub total_bytes: i64,
}

pub struct MessageCache {
    reader: SqlitePool,
    writer: SqlitePool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MessageCache {
    /// Open (creating if needed) the cache database at `path` and apply migrations.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "MEMORY");

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        MIGRATOR.run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options)
            .await?;

        log::info!("message cache opened at {}", path.display());

        Ok(Self {
            reader,
            writer,
            ttl,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source. Used by tests to move time forward.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Look up a result. Expired and undecodable rows read as absent.
    pub async fn get(&self, message_id: &str) -> Result<Option<CachedResult>, CacheError> {
        let row: Option<(Vec<u8>, i64)> = sqlx::query_as(
            "SELECT result_data, created_at FROM parsed_results WHERE message_id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.reader)
        .await?;

        let Some((data, created_at)) = row else {
            return Ok(None);
        };

        if self.now_millis().saturating_sub(created_at) > self.ttl_millis() {
            log::debug!("cache entry for {} expired", message_id);
            return Ok(None);
        }

        match bincode::deserialize::<CachedResult>(&data) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                log::warn!("discarding undecodable cache entry {}: {}", message_id, e);
                Ok(None)
            }
        }
    }

    /// Insert or overwrite the result for `message_id`, resetting its age.
    pub async fn set(&self, message_id: &str, result: &CachedResult) -> Result<(), CacheError> {
        let data = bincode::serialize(result).map_err(|e| CacheError::Serialize(e.to_string()))?;

        sqlx::query(
            "INSERT INTO parsed_results (message_id, result_data, created_at) VALUES (?, ?, ?)
             ON CONFLICT(message_id) DO UPDATE SET
                result_data = excluded.result_data,
                created_at = excluded.created_at",
        )
        .bind(message_id)
        .bind(data)
        .bind(self.now_millis())
        .execute(&self.writer)
        .await?;

        Ok(())
    }

    /// Delete every entry and compact the file.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let deleted = sqlx::query("DELETE FROM parsed_results")
            .execute(&self.writer)
            .await?
            .rows_affected();
        sqlx::query("VACUUM").execute(&self.writer).await?;

        log::info!("message cache cleared ({} entries)", deleted);
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let (count, total_bytes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(length(result_data)), 0) FROM parsed_results",
        )
        .fetch_one(&self.reader)
        .await?;

        Ok(CacheStats { count, total_bytes })
    }

    /// Delete rows older than the TTL, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let cutoff = self.now_millis().saturating_sub(self.ttl_millis());
        let purged = sqlx::query("DELETE FROM parsed_results WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.writer)
            .await?
            .rows_affected();

        if purged > 0 {
            log::info!("purged {} expired cache entries", purged);
        }
        Ok(purged)
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        log::debug!("cache sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.purge_expired().await {
                            log::warn!("cache sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
