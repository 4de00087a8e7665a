//! Per-user sliding-window rate limiting for heartbeat actions.
//!
//! Keyed the same way as the quiet-hours check — independent of the global
//! heartbeat cadence, so a single chatty user can't starve everyone else's
//! actions out of a beat. Tracks the timestamps of a key's recent hits in a
//! `VecDeque` and evicts anything older than the window on each check,
//! mirroring the keyed-limiter-with-stale-cleanup shape without pulling in
//! a token-bucket crate the rest of this crate doesn't otherwise need.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Sliding-window limiter: at most `max_per_window` hits per key within
/// `window`, evaluated continuously rather than reset at fixed boundaries.
pub struct RateLimiter {
    window: Duration,
    max_per_window: usize,
    hits: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            window,
            max_per_window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` if it fits under the window, returning
    /// whether it was allowed. Denied hits are not recorded.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let entry = hits.entry(key.to_string()).or_default();
        evict_stale(entry, now, self.window);

        if entry.len() >= self.max_per_window {
            false
        } else {
            entry.push_back(now);
            true
        }
    }

    /// Drops any tracked key whose entire window has expired, so long-lived
    /// deployments don't accumulate one `VecDeque` per user forever.
    pub async fn cleanup_stale(&self) {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        hits.retain(|_, entry| {
            evict_stale(entry, now, self.window);
            !entry.is_empty()
        });
    }
}

fn evict_stale(entry: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = entry.front() {
        if now.duration_since(oldest) > window {
            entry.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_configured_burst_then_denies() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("u1").await);
        assert!(limiter.check("u1").await);
        assert!(!limiter.check("u1").await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("u1").await);
        assert!(limiter.check("u2").await);
        assert!(!limiter.check("u1").await);
    }

    #[tokio::test]
    async fn stale_hits_fall_out_of_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("u1").await);
        assert!(!limiter.check("u1").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("u1").await);
    }

    #[tokio::test]
    async fn cleanup_stale_drops_keys_whose_window_has_fully_expired() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        limiter.check("u1").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup_stale().await;
        assert!(limiter.hits.read().await.is_empty());
    }
}
