//! Token-bucket rate limiting (§4.3), one bucket per `(connection, method)`
//! pair. Adapted from the reference peer-bandwidth throttle: same refill law,
//! generalized from a byte budget to an RPC call budget and keyed per pair
//! instead of per connection.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// A single `(connection, method)` budget.
struct TokenBucket {
    limit: u64,
    period: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(limit: u64, period: Duration) -> Self {
        Self {
            limit,
            period,
            tokens: limit as f64,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if self.period.is_zero() {
            self.tokens = self.limit as f64;
        } else {
            let refilled = self.limit as f64 * (elapsed.as_secs_f64() / self.period.as_secs_f64());
            self.tokens = (self.tokens + refilled).min(self.limit as f64);
        }
        self.last_refill = now;
    }
}

/// Per-`(connection, method)` token-bucket limiter. Buckets are created
/// lazily on first use and must be dropped by the caller when a connection
/// closes via [`RateLimiter::remove_connection`].
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<(Uuid, String), TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Returns `true` if the call is admitted, `false` if the bucket is exhausted.
    pub fn check(&self, conn_id: Uuid, method: &str, limit: u64, period: Duration) -> bool {
        let key = (conn_id, method.to_string());
        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(limit, period));
        bucket.try_consume()
    }

    /// Discard every bucket belonging to a closed connection.
    pub fn remove_connection(&self, conn_id: Uuid) {
        self.buckets.retain(|(id, _), _| *id != conn_id);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_denies() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        for _ in 0..5 {
            assert!(limiter.check(conn, "add", 5, Duration::from_secs(1)));
        }
        assert!(!limiter.check(conn, "add", 5, Duration::from_secs(1)));
    }

    #[test]
    fn buckets_are_independent_per_method() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        assert!(limiter.check(conn, "add", 1, Duration::from_secs(1)));
        assert!(!limiter.check(conn, "add", 1, Duration::from_secs(1)));
        assert!(limiter.check(conn, "sub", 1, Duration::from_secs(1)));
    }

    #[test]
    fn buckets_are_independent_per_connection() {
        let limiter = RateLimiter::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(limiter.check(a, "add", 1, Duration::from_secs(1)));
        assert!(!limiter.check(a, "add", 1, Duration::from_secs(1)));
        assert!(limiter.check(b, "add", 1, Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn tokens_refill_over_elapsed_time() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        assert!(limiter.check(conn, "add", 10, Duration::from_millis(100)));
        for _ in 0..9 {
            limiter.check(conn, "add", 10, Duration::from_millis(100));
        }
        assert!(!limiter.check(conn, "add", 10, Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.check(conn, "add", 10, Duration::from_millis(100)));
    }

    #[test]
    fn remove_connection_drops_its_buckets() {
        let limiter = RateLimiter::new();
        let conn = Uuid::new_v4();
        limiter.check(conn, "add", 5, Duration::from_secs(1));
        assert_eq!(limiter.bucket_count(), 1);
        limiter.remove_connection(conn);
        assert_eq!(limiter.bucket_count(), 0);
    }
}
