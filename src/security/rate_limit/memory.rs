//! In-process sliding-window rate limiter.
//!
//! State lives only in this process: it is lost on restart and not shared
//! between instances.

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::security::now_millis;
use crate::security::rate_limit::window::SlidingWindow;
use crate::security::rate_limit::{RateLimitSettings, RateLimiter};

pub struct MemoryRateLimiter {
    settings: RateLimitSettings,
    window: SlidingWindow<String>,
}

impl MemoryRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            window: SlidingWindow::new(settings.window),
            settings,
        }
    }

    pub fn check_limit_at(&self, identifier: &str, now: u64) -> bool {
        self.window
            .try_acquire(identifier.to_string(), self.settings.max_requests, now)
    }

    pub fn remaining_at(&self, identifier: &str, now: u64) -> u32 {
        let used = self.window.count(&identifier.to_string(), now);
        let used = u32::try_from(used).unwrap_or(u32::MAX);
        self.settings.max_requests.saturating_sub(used)
    }

    pub fn sweep_at(&self, now: u64) -> usize {
        self.window.sweep(now)
    }

    /// Number of identifiers with live entries.
    pub fn tracked_identifiers(&self) -> usize {
        self.window.tracked_keys()
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check_limit<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, bool> {
        future::ready(self.check_limit_at(identifier, now_millis())).boxed()
    }

    fn remaining<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, u32> {
        future::ready(self.remaining_at(identifier, now_millis())).boxed()
    }

    fn reset<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ()> {
        self.window.clear(&identifier.to_string());
        future::ready(()).boxed()
    }

    fn cleanup(&self) -> BoxFuture<'_, ()> {
        let removed = self.sweep_at(now_millis());
        tracing::debug!(
            removed,
            tracked = self.tracked_identifiers(),
            "Rate limit sweep finished"
        );
        future::ready(()).boxed()
    }

    fn settings(&self) -> RateLimitSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(max_requests: u32, window_ms: u64) -> MemoryRateLimiter {
        MemoryRateLimiter::new(RateLimitSettings {
            window: Duration::from_millis(window_ms),
            max_requests,
        })
    }

    #[test]
    fn test_n_then_reject() {
        let rl = limiter(5, 60_000);
        let now = 1_000_000;
        for _ in 0..5 {
            assert!(rl.check_limit_at("1.2.3.4", now));
        }
        assert!(!rl.check_limit_at("1.2.3.4", now));
        assert!(rl.check_limit_at("5.6.7.8", now));

        // Window elapsed.
        assert!(rl.check_limit_at("1.2.3.4", now + 60_000));
    }

    #[test]
    fn test_remaining_bounds() {
        let rl = limiter(3, 60_000);
        let now = 1_000_000;
        assert_eq!(rl.remaining_at("id", now), 3);
        for expected in [2, 1, 0, 0, 0] {
            rl.check_limit_at("id", now);
            let remaining = rl.remaining_at("id", now);
            assert_eq!(remaining, expected);
            assert!(remaining <= 3);
        }
        assert_eq!(rl.remaining_at("id", now + 60_000), 3);
    }

    #[tokio::test]
    async fn test_trait_surface() {
        let rl = limiter(2, 60_000);
        let limiter: &dyn RateLimiter = &rl;

        assert!(limiter.check_limit("user:42").await);
        assert!(limiter.check_limit("user:42").await);
        assert!(!limiter.check_limit("user:42").await);
        assert_eq!(limiter.remaining("user:42").await, 0);

        limiter.reset("user:42").await;
        assert_eq!(limiter.remaining("user:42").await, 2);
        assert!(limiter.check_limit("user:42").await);
    }

    #[tokio::test]
    async fn test_window_elapses_in_real_time() {
        let rl = limiter(1, 50);
        assert!(rl.check_limit("ip").await);
        assert!(!rl.check_limit("ip").await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rl.check_limit("ip").await);
    }

    #[tokio::test]
    async fn test_cleanup_forgets_idle_identifiers() {
        let rl = limiter(10, 60_000);
        let now = 1_000_000;
        rl.check_limit_at("a", now);
        rl.check_limit_at("b", now + 30_000);

        assert_eq!(rl.sweep_at(now + 60_000), 1);
        assert_eq!(rl.tracked_identifiers(), 1);
        assert_eq!(rl.remaining_at("b", now + 60_000), 9);
    }
}
