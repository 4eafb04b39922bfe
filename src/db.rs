//! Durable cache of converted media.
//! Maps a source content hash to the remote file handle of its converted upload.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::errors::ConversionError;

/// Open the SQLite pool backing the cache, creating the file if needed
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}

/// Database operations for the conversion cache
#[derive(Clone)]
pub struct CacheDb {
    pool: Arc<SqlitePool>,
}

impl CacheDb {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Start a transactional scope for one conversion request
    pub async fn begin(&self) -> Result<CacheScope, ConversionError> {
        let tx = self.pool.begin().await?;
        Ok(CacheScope { tx })
    }

    /// Read-only lookup outside of any worker scope
    pub async fn check_cached(&self, content_hash: &str) -> Result<Option<String>, ConversionError> {
        let row = sqlx::query("SELECT remote_handle FROM converted_media WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(|row| row.get("remote_handle")))
    }

    pub async fn count(&self) -> Result<i64, ConversionError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM converted_media")
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }
}

/// One request's unit of work against the cache.
///
/// Dropping the scope without calling [`CacheScope::commit`] rolls it back.
pub struct CacheScope {
    tx: Transaction<'static, Sqlite>,
}

impl CacheScope {
    pub async fn get_by_hash(&mut self, content_hash: &str) -> Result<Option<String>, ConversionError> {
        let row = sqlx::query("SELECT remote_handle FROM converted_media WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|row| row.get("remote_handle")))
    }

    /// Insert a new mapping. Returns `false` when a row for the hash already
    /// existed; existing rows are never overwritten.
    pub async fn put_by_hash(
        &mut self,
        content_hash: &str,
        remote_handle: &str,
    ) -> Result<bool, ConversionError> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO converted_media (content_hash, remote_handle, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(content_hash)
        .bind(remote_handle)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn commit(self) -> Result<(), ConversionError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ConversionError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Single-connection in-memory pool with migrations applied
#[cfg(test)]
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::migrations::run_migrations(&pool).await.unwrap();
    Arc::new(pool)
}
