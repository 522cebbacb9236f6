//! Generic concurrent sliding-window counter.

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;

/// Per-key timestamp log over a moving window ending at "now".
///
/// An entry counts while `timestamp > now - window`. All mutation of a key's
/// log happens under that key's DashMap shard lock, which makes
/// [`SlidingWindow::try_acquire`] an atomic count-and-record.
pub struct SlidingWindow<K> {
    window_ms: u64,
    entries: DashMap<K, Vec<u64>>,
}

impl<K> SlidingWindow<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            entries: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn cutoff(&self, now: u64) -> u64 {
        now.saturating_sub(self.window_ms)
    }

    /// Record `now` for `key` if fewer than `limit` entries are live.
    ///
    /// Returns false, without recording, when the key is at its limit.
    pub fn try_acquire(&self, key: K, limit: u32, now: u64) -> bool {
        let cutoff = self.cutoff(now);
        let mut log = self.entries.entry(key).or_default();
        log.retain(|&t| t > cutoff);

        if log.len() < limit as usize {
            log.push(now);
            true
        } else {
            false
        }
    }

    /// Live entries for `key`. Read-only.
    pub fn count(&self, key: &K, now: u64) -> usize {
        let cutoff = self.cutoff(now);
        self.entries
            .get(key)
            .map(|log| log.iter().filter(|&&t| t > cutoff).count())
            .unwrap_or(0)
    }

    pub fn clear(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop entries outside the window and forget keys left empty.
    ///
    /// Returns the number of timestamps removed.
    pub fn sweep(&self, now: u64) -> usize {
        let cutoff = self.cutoff(now);
        let mut removed = 0;
        self.entries.retain(|_, log| {
            let before = log.len();
            log.retain(|&t| t > cutoff);
            removed += before - log.len();
            !log.is_empty()
        });
        removed
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}
