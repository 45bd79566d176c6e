use std::time::{Duration, Instant};

use dashmap::DashMap;

const DEFAULT_PRUNE_AT: usize = 10_000;

/// Fixed-window request counter keyed by client address
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    prune_at: usize,
    entries: DashMap<String, (u32, Instant)>,
}

impl RateLimiter {
    /// `limit` requests per minute; 0 disables limiting
    pub fn per_minute(limit: u32) -> Self {
        Self::with_window(limit, Duration::from_secs(60))
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        RateLimiter {
            limit,
            window,
            prune_at: DEFAULT_PRUNE_AT,
            entries: DashMap::new(),
        }
    }

    /// Drop expired windows once this many clients are tracked
    pub fn with_prune_threshold(mut self, clients: usize) -> Self {
        self.prune_at = clients.max(1);
        self
    }

    /// Count a request from `client`, returning false once over the limit
    pub fn check(&self, client: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        // must run before `entry` takes a shard lock
        if self.entries.len() >= self.prune_at {
            let window = self.window;
            self.entries
                .retain(|_, (_, started)| now.duration_since(*started) <= window);
        }

        let mut entry = self
            .entries
            .entry(client.to_string())
            .or_insert_with(|| (0, now));

        if now.duration_since(entry.1) > self.window {
            *entry = (0, now);
        }

        entry.0 += 1;
        entry.0 <= self.limit
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_client() {
        let limiter = RateLimiter::per_minute(2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::per_minute(0);
        assert!((0..500).all(|_| limiter.check("10.0.0.1")));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(20));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check("a"));
    }

    #[test]
    fn test_expired_clients_are_pruned() {
        let limiter = RateLimiter::with_window(5, Duration::from_millis(20)).with_prune_threshold(2);
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert_eq!(limiter.tracked_clients(), 2);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check("c"));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_live_clients_survive_pruning() {
        let limiter = RateLimiter::per_minute(1).with_prune_threshold(1);
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
        assert!(!limiter.check("a"));
        assert_eq!(limiter.tracked_clients(), 2);
    }
}
