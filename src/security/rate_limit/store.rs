//! Durable storage for rate-limit events.
//!
//! # Schema
//! ```text
//! rate_limit_events(id BIGSERIAL, identifier TEXT, ts_ms BIGINT)
//! index on (identifier, ts_ms)
//! ```
//!
//! # Design Decisions
//! - One row per admitted request
//! - COUNT + INSERT run in one transaction holding a per-identifier advisory
//!   lock, so concurrent instances cannot both admit the last slot
//! - Errors are typed; the fail-open decision belongs to the limiter
//! - The schema is created lazily before the first query and retried until it
//!   succeeds, so a database that was down at startup still gets its table

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Serializes schema creation across instances sharing a database.
const MIGRATION_LOCK_KEY: i64 = 0x7261_7465_6c69_6d;

/// Errors from the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Storage operations needed by the durable sliding window.
///
/// An entry counts while `ts_ms > now - window_ms`.
pub trait WindowStore: Send + Sync {
    /// Atomically count live entries and record `now` if under `max_requests`.
    fn check_and_record<'a>(
        &'a self,
        identifier: &'a str,
        now: u64,
        window_ms: u64,
        max_requests: u32,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Count entries with `ts_ms > since`.
    fn count_since<'a>(&'a self, identifier: &'a str, since: u64) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Delete every entry for `identifier`.
    fn clear<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<u64, StoreError>>;

    /// Delete entries with `ts_ms <= cutoff`.
    fn purge_before(&self, cutoff: u64) -> BoxFuture<'_, Result<u64, StoreError>>;
}

/// Runs an initializer until it first succeeds; failures leave it armed.
#[derive(Debug, Default)]
pub struct SchemaGuard {
    ready: OnceCell<()>,
}

impl SchemaGuard {
    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    pub async fn ensure<F, Fut>(&self, init: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        self.ready.get_or_try_init(init).await.map(|_| ())
    }
}

/// Postgres-backed [`WindowStore`].
#[derive(Clone)]
pub struct PgWindowStore {
    pool: PgPool,
    schema: Arc<SchemaGuard>,
}

impl PgWindowStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: Arc::new(SchemaGuard::default()),
        }
    }

    /// Build a lazily connecting pool.
    ///
    /// Only the URL is checked here, so an unreachable database does not block
    /// startup; the limiter fails open until it comes back.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the events table and index if this store hasn't done so yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        self.schema.ensure(|| self.create_schema()).await
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rate_limit_events (
                id BIGSERIAL PRIMARY KEY,
                identifier TEXT NOT NULL,
                ts_ms BIGINT NOT NULL
            )",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS rate_limit_events_identifier_ts
             ON rate_limit_events (identifier, ts_ms)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!("Rate limit store schema ready");
        Ok(())
    }
}

fn to_db(ts: u64) -> i64 {
    i64::try_from(ts).unwrap_or(i64::MAX)
}

impl WindowStore for PgWindowStore {
    fn check_and_record<'a>(
        &'a self,
        identifier: &'a str,
        now: u64,
        window_ms: u64,
        max_requests: u32,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            self.migrate().await?;
            let mut tx = self.pool.begin().await?;

            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(identifier)
                .execute(&mut *tx)
                .await?;

            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM rate_limit_events WHERE identifier = $1 AND ts_ms > $2",
            )
            .bind(identifier)
            .bind(to_db(now.saturating_sub(window_ms)))
            .fetch_one(&mut *tx)
            .await?;

            if count >= i64::from(max_requests) {
                tx.rollback().await?;
                return Ok(false);
            }

            sqlx::query("INSERT INTO rate_limit_events (identifier, ts_ms) VALUES ($1, $2)")
                .bind(identifier)
                .bind(to_db(now))
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(true)
        })
    }

    fn count_since<'a>(&'a self, identifier: &'a str, since: u64) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            self.migrate().await?;
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM rate_limit_events WHERE identifier = $1 AND ts_ms > $2",
            )
            .bind(identifier)
            .bind(to_db(since))
            .fetch_one(&self.pool)
            .await?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn clear<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            self.migrate().await?;
            let result = sqlx::query("DELETE FROM rate_limit_events WHERE identifier = $1")
                .bind(identifier)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }

    fn purge_before(&self, cutoff: u64) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.migrate().await?;
            let result = sqlx::query("DELETE FROM rate_limit_events WHERE ts_ms <= $1")
                .bind(to_db(cutoff))
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }
}
