//! Store-backed sliding-window rate limiter.
//!
//! Every store call is bounded by a deadline. The `try_*` methods surface
//! [`StoreError`]s; the [`RateLimiter`] impl fails open on them.

use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::observability::metrics;
use crate::security::now_millis;
use crate::security::rate_limit::store::{StoreError, WindowStore};
use crate::security::rate_limit::{RateLimitSettings, RateLimiter};

pub struct DurableRateLimiter<S> {
    store: S,
    settings: RateLimitSettings,
    timeout: Duration,
}

impl<S: WindowStore> DurableRateLimiter<S> {
    pub fn new(store: S, settings: RateLimitSettings, timeout: Duration) -> Self {
        Self {
            store,
            settings,
            timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.settings.window.as_millis()).unwrap_or(u64::MAX)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    pub async fn try_check_limit(&self, identifier: &str) -> Result<bool, StoreError> {
        self.try_check_limit_at(identifier, now_millis()).await
    }

    pub async fn try_check_limit_at(&self, identifier: &str, now: u64) -> Result<bool, StoreError> {
        self.bounded(self.store.check_and_record(
            identifier,
            now,
            self.window_ms(),
            self.settings.max_requests,
        ))
        .await
    }

    pub async fn try_remaining(&self, identifier: &str) -> Result<u32, StoreError> {
        let since = now_millis().saturating_sub(self.window_ms());
        let used = self.bounded(self.store.count_since(identifier, since)).await?;
        let used = u32::try_from(used).unwrap_or(u32::MAX);
        Ok(self.settings.max_requests.saturating_sub(used))
    }

    pub async fn try_reset(&self, identifier: &str) -> Result<u64, StoreError> {
        self.bounded(self.store.clear(identifier)).await
    }

    pub async fn try_cleanup(&self) -> Result<u64, StoreError> {
        let cutoff = now_millis().saturating_sub(self.window_ms());
        self.bounded(self.store.purge_before(cutoff)).await
    }
}

impl<S: WindowStore> RateLimiter for DurableRateLimiter<S> {
    fn check_limit<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match self.try_check_limit(identifier).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    tracing::error!(
                        identifier = %identifier,
                        error = %e,
                        "Rate limit store failed, allowing request"
                    );
                    metrics::record_store_error("check_limit");
                    true
                }
            }
        })
    }

    fn remaining<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, u32> {
        Box::pin(async move {
            match self.try_remaining(identifier).await {
                Ok(remaining) => remaining,
                Err(e) => {
                    tracing::error!(identifier = %identifier, error = %e, "Rate limit store failed");
                    metrics::record_store_error("remaining");
                    self.settings.max_requests
                }
            }
        })
    }

    fn reset<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.try_reset(identifier).await {
                tracing::error!(identifier = %identifier, error = %e, "Failed to reset rate limit");
                metrics::record_store_error("reset");
            }
        })
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.try_cleanup().await {
                Ok(removed) => tracing::debug!(removed, "Rate limit store sweep finished"),
                Err(e) => {
                    tracing::error!(error = %e, "Rate limit store sweep failed");
                    metrics::record_store_error("cleanup");
                }
            }
        })
    }

    fn settings(&self) -> RateLimitSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Row-per-event store kept in a Vec, locked for the whole check.
    #[derive(Default)]
    struct VecStore {
        rows: Mutex<Vec<(String, u64)>>,
    }

    impl WindowStore for VecStore {
        fn check_and_record<'a>(
            &'a self,
            identifier: &'a str,
            now: u64,
            window_ms: u64,
            max_requests: u32,
        ) -> BoxFuture<'a, Result<bool, StoreError>> {
            Box::pin(async move {
                let mut rows = self.rows.lock().unwrap();
                let cutoff = now.saturating_sub(window_ms);
                let count = rows
                    .iter()
                    .filter(|(id, ts)| id == identifier && *ts > cutoff)
                    .count();
                if count >= max_requests as usize {
                    return Ok(false);
                }
                rows.push((identifier.to_string(), now));
                Ok(true)
            })
        }

        fn count_since<'a>(&'a self, identifier: &'a str, since: u64) -> BoxFuture<'a, Result<u64, StoreError>> {
            Box::pin(async move {
                let rows = self.rows.lock().unwrap();
                Ok(rows.iter().filter(|(id, ts)| id == identifier && *ts > since).count() as u64)
            })
        }

        fn clear<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
            Box::pin(async move {
                let mut rows = self.rows.lock().unwrap();
                let before = rows.len();
                rows.retain(|(id, _)| id != identifier);
                Ok((before - rows.len()) as u64)
            })
        }

        fn purge_before(&self, cutoff: u64) -> BoxFuture<'_, Result<u64, StoreError>> {
            Box::pin(async move {
                let mut rows = self.rows.lock().unwrap();
                let before = rows.len();
                rows.retain(|(_, ts)| *ts > cutoff);
                Ok((before - rows.len()) as u64)
            })
        }
    }

    /// Store whose every call fails, counting attempts.
    #[derive(Default)]
    struct BrokenStore {
        calls: AtomicUsize,
    }

    impl BrokenStore {
        fn fail<T>(&self) -> BoxFuture<'_, Result<T, StoreError>>
        where
            T: Send + 'static,
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolTimedOut)) })
        }
    }

    impl WindowStore for BrokenStore {
        fn check_and_record<'a>(&'a self, _: &'a str, _: u64, _: u64, _: u32) -> BoxFuture<'a, Result<bool, StoreError>> {
            self.fail()
        }
        fn count_since<'a>(&'a self, _: &'a str, _: u64) -> BoxFuture<'a, Result<u64, StoreError>> {
            self.fail()
        }
        fn clear<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
            self.fail()
        }
        fn purge_before(&self, _: u64) -> BoxFuture<'_, Result<u64, StoreError>> {
            self.fail()
        }
    }

    /// Store that never answers in time.
    struct HangingStore;

    impl WindowStore for HangingStore {
        fn check_and_record<'a>(&'a self, _: &'a str, _: u64, _: u64, _: u32) -> BoxFuture<'a, Result<bool, StoreError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(false)
            })
        }
        fn count_since<'a>(&'a self, _: &'a str, _: u64) -> BoxFuture<'a, Result<u64, StoreError>> {
            Box::pin(std::future::pending())
        }
        fn clear<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
            Box::pin(std::future::pending())
        }
        fn purge_before(&self, _: u64) -> BoxFuture<'_, Result<u64, StoreError>> {
            Box::pin(std::future::pending())
        }
    }

    fn settings(max_requests: u32, window_ms: u64) -> RateLimitSettings {
        RateLimitSettings {
            window: Duration::from_millis(window_ms),
            max_requests,
        }
    }

    #[tokio::test]
    async fn test_admits_quota_then_rejects() {
        let rl = DurableRateLimiter::new(VecStore::default(), settings(3, 60_000), Duration::from_secs(1));
        let now = 5_000_000;
        for _ in 0..3 {
            assert!(rl.try_check_limit_at("ip", now).await.unwrap());
        }
        assert!(!rl.try_check_limit_at("ip", now).await.unwrap());
        assert_eq!(rl.store().rows.lock().unwrap().len(), 3);

        assert!(rl.try_check_limit_at("ip", now + 60_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_remaining_reset_cleanup() {
        let rl = DurableRateLimiter::new(VecStore::default(), settings(4, 60_000), Duration::from_secs(1));
        assert!(rl.check_limit("user").await);
        assert!(rl.check_limit("user").await);
        assert_eq!(rl.remaining("user").await, 2);

        rl.reset("user").await;
        assert_eq!(rl.remaining("user").await, 4);

        rl.store().rows.lock().unwrap().push(("stale".into(), 1));
        assert_eq!(rl.try_cleanup().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fails_open_on_store_error() {
        let rl = DurableRateLimiter::new(BrokenStore::default(), settings(1, 60_000), Duration::from_secs(1));

        assert!(matches!(rl.try_check_limit("ip").await, Err(StoreError::Database(_))));
        for _ in 0..5 {
            assert!(rl.check_limit("ip").await);
        }
        assert_eq!(rl.remaining("ip").await, 1);
        rl.reset("ip").await;
        rl.cleanup().await;
        assert_eq!(rl.store().calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_timeout_fails_open() {
        let rl = DurableRateLimiter::new(HangingStore, settings(1, 60_000), Duration::from_millis(20));

        let err = rl.try_check_limit("ip").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(rl.check_limit("ip").await);
        assert_eq!(rl.remaining("ip").await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_respect_quota() {
        let rl = Arc::new(DurableRateLimiter::new(
            VecStore::default(),
            settings(10, 60_000),
            Duration::from_secs(1),
        ));

        let mut tasks = Vec::new();
        for _ in 0..40 {
            let rl = rl.clone();
            tasks.push(tokio::spawn(async move { rl.check_limit("burst").await }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
