//! Rate limiting for the token endpoint
//!
//! - Failed logins per username: 5 per 15 minutes
//! - Token requests per IP address: 10 per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, pruned to a fixed window
struct SlidingWindow<K> {
    window: Duration,
    limit: usize,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(window: Duration, limit: usize) -> Self {
        Self {
            window,
            limit,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: &K) -> bool {
        let cutoff = Utc::now() - self.window;
        let events = self.events.read().await;
        events
            .get(key)
            .map(|times| times.iter().filter(|t| **t > cutoff).count() >= self.limit)
            .unwrap_or(false)
    }

    async fn record(&self, key: K) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.push(now);
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    usernames: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            usernames: SlidingWindow::new(Duration::minutes(15), 5),
            ips: SlidingWindow::new(Duration::minutes(1), 10),
        }
    }

    /// Usernames are compared case-insensitively
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames.is_limited(&username.to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames.record(username.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(&ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip).await;
    }

    /// Drop expired entries. Called periodically from a background task.
    pub async fn cleanup(&self) {
        self.usernames.prune().await;
        self.ips.prune().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_username_limit_after_five_failures() {
        let limiter = LoginRateLimiter::new();

        for _ in 0..4 {
            limiter.record_failed_attempt("rita").await;
            assert!(!limiter.is_username_limited("rita").await);
        }
        limiter.record_failed_attempt("rita").await;
        assert!(limiter.is_username_limited("rita").await);

        limiter.clear_username_attempts("rita").await;
        assert!(!limiter.is_username_limited("rita").await);
    }

    #[tokio::test]
    async fn test_username_is_case_insensitive() {
        let limiter = LoginRateLimiter::new();
        for name in ["Rita", "RITA", "rita", "rItA", "ritA"] {
            limiter.record_failed_attempt(name).await;
        }
        assert!(limiter.is_username_limited("RiTa").await);
    }

    #[tokio::test]
    async fn test_ip_limit_after_ten_requests() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::from_str("10.0.0.1").unwrap();
        let other = IpAddr::from_str("10.0.0.2").unwrap();

        for _ in 0..10 {
            assert!(!limiter.is_ip_limited(ip).await);
            limiter.record_ip_request(ip).await;
        }
        assert!(limiter.is_ip_limited(ip).await);
        assert!(!limiter.is_ip_limited(other).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failed_attempt("rita").await;
        }
        limiter.cleanup().await;
        assert!(limiter.is_username_limited("rita").await);
    }
}
