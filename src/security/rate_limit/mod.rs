//! Sliding-window rate limiting.
//!
//! # Data Flow
//! ```text
//! state-changing request
//!     → RateLimiter::check_limit(identifier)
//!         memory.rs  → window.rs (DashMap of timestamp logs)
//!         durable.rs → store.rs (Postgres rows, bounded by a deadline)
//!     → allowed: continue / rejected: 429
//!
//! every cleanup_interval (own task):
//!     → RateLimiter::cleanup() drops entries older than the window
//! ```
//!
//! # Design Decisions
//! - Check-and-record is atomic per identifier in both backends
//! - A rejected call is never recorded
//! - The durable limiter fails OPEN on store errors; CSRF fails closed.
//!   Keep the two policies separate.

pub mod durable;
pub mod memory;
pub mod store;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::{RateLimitConfig, RateLimitMode};

pub use durable::DurableRateLimiter;
pub use memory::MemoryRateLimiter;
pub use store::{PgWindowStore, StoreError, WindowStore};
pub use window::SlidingWindow;

/// Window length and quota shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window(),
            max_requests: config.max_requests,
        }
    }
}

/// Common contract of the ephemeral and durable limiters.
pub trait RateLimiter: Send + Sync {
    /// Count live entries and record a new one if under quota.
    fn check_limit<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, bool>;

    /// `max_requests - live entries`, never negative. May race with `check_limit`.
    fn remaining<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, u32>;

    /// Forget every entry for `identifier`.
    fn reset<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ()>;

    /// Delete entries older than the window.
    fn cleanup(&self) -> BoxFuture<'_, ()>;

    fn settings(&self) -> RateLimitSettings;
}

/// Build the limiter selected by `config.mode`.
///
/// Durable mode connects lazily and tries to create its schema. A failed
/// attempt is logged and the limiter starts anyway; the store retries the
/// schema before each query and the limiter fails open until it succeeds.
pub async fn build_rate_limiter(config: &RateLimitConfig) -> Result<Arc<dyn RateLimiter>, StoreError> {
    let settings = RateLimitSettings::from(config);

    match config.mode {
        RateLimitMode::Memory => {
            tracing::info!(
                window_ms = config.window_ms,
                max_requests = config.max_requests,
                "Using in-memory rate limiter"
            );
            Ok(Arc::new(MemoryRateLimiter::new(settings)))
        }
        RateLimitMode::Durable => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let store = PgWindowStore::connect_lazy(url, config.store_timeout())?;

            match time::timeout(config.store_timeout(), store.migrate()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Rate limit store migration failed, retrying on first use"),
                Err(_) => tracing::error!("Rate limit store migration timed out, retrying on first use"),
            }

            tracing::info!(
                window_ms = config.window_ms,
                max_requests = config.max_requests,
                "Using durable rate limiter"
            );
            Ok(Arc::new(DurableRateLimiter::new(
                store,
                settings,
                config.store_timeout(),
            )))
        }
    }
}

/// Run `cleanup()` every `interval` until shutdown.
pub fn spawn_cleanup(
    limiter: Arc<dyn RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Rate limit cleanup task starting");
        let mut ticker = time::interval_at(Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.cleanup().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit cleanup task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
