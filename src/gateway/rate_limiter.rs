//! Per-upstream token-bucket throttle
//!
//! Every outbound call acquires a token for its upstream first. Acquisition never
//! fails, it only delays. Upstreams without a configured bucket are not throttled.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorLimiter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Bucket parameters for one upstream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum burst size
    pub capacity: f64,
    /// Tokens added per second
    pub refill_per_sec: f64,
}

impl BucketConfig {
    /// GCRA quota: one cell every `1 / refill_per_sec`, bursting up to `capacity`
    fn quota(&self) -> Option<Quota> {
        if self.capacity < 1.0 || !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return None;
        }
        let burst = NonZeroU32::new(self.capacity.floor().min(u32::MAX as f64) as u32)?;
        let period = Duration::from_secs_f64(1.0 / self.refill_per_sec);
        Quota::with_period(period).map(|q| q.allow_burst(burst))
    }
}

/// Token-bucket rate limiter keyed by upstream name
pub struct RateLimiter {
    buckets: HashMap<String, DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Create a limiter with one bucket per configured upstream
    pub fn new(limits: &HashMap<String, BucketConfig>) -> Self {
        let buckets = limits
            .iter()
            .filter_map(|(key, cfg)| match cfg.quota() {
                Some(quota) => Some((key.clone(), GovernorLimiter::direct(quota))),
                None => {
                    warn!(upstream = %key, ?cfg, "Ignoring unusable rate limit");
                    None
                }
            })
            .collect();
        Self { buckets }
    }

    /// A limiter with no configured upstreams (everything passes through)
    pub fn unlimited() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    pub fn is_limited(&self, upstream: &str) -> bool {
        self.buckets.contains_key(upstream)
    }

    /// Wait until a token is available for `upstream`
    pub async fn acquire(&self, upstream: &str) {
        let Some(bucket) = self.buckets.get(upstream) else {
            trace!(upstream, "No rate limit configured, passing through");
            return;
        };

        if bucket.check().is_ok() {
            return;
        }
        debug!(upstream, "Rate limited, waiting");
        bucket.until_ready().await;
    }

    /// Take a token without waiting. Unknown upstreams always succeed.
    pub fn try_acquire(&self, upstream: &str) -> bool {
        self.buckets
            .get(upstream)
            .map_or(true, |bucket| bucket.check().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn limiter(capacity: f64, refill_per_sec: f64) -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(
            "dexscreener".to_string(),
            BucketConfig {
                capacity,
                refill_per_sec,
            },
        );
        RateLimiter::new(&limits)
    }

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = limiter(10.0, 1.0);
        let start = Instant::now();

        for _ in 0..15 {
            limiter.acquire("dexscreener").await;
        }

        // 10 from the burst, then one per second; small slack for clock granularity
        assert!(start.elapsed() >= Duration::from_millis(4_950));
    }

    #[tokio::test]
    async fn test_burst_is_immediate() {
        let limiter = limiter(10.0, 1.0);
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire("dexscreener").await;
        }

        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!limiter.try_acquire("dexscreener"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_bucket() {
        let limiter = Arc::new(limiter(2.0, 10.0));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("dexscreener").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 2 immediate, 4 more at 10/s
        assert!(start.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_unknown_upstream_passes_through() {
        let limiter = limiter(1.0, 0.1);
        let start = Instant::now();

        for _ in 0..100 {
            limiter.acquire("helius").await;
        }

        assert!(!limiter.is_limited("helius"));
        assert!(limiter.try_acquire("helius"));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_refill_capped_at_capacity() {
        let limiter = limiter(3.0, 4.0);
        for _ in 0..3 {
            assert!(limiter.try_acquire("dexscreener"));
        }

        // Long enough to refill well past capacity
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        for _ in 0..3 {
            assert!(limiter.try_acquire("dexscreener"));
        }
        assert!(!limiter.try_acquire("dexscreener"));
    }

    #[test]
    fn test_unusable_configs_are_skipped() {
        let mut limits = HashMap::new();
        limits.insert("a".to_string(), BucketConfig { capacity: 0.5, refill_per_sec: 1.0 });
        limits.insert("b".to_string(), BucketConfig { capacity: 5.0, refill_per_sec: 0.0 });
        let limiter = RateLimiter::new(&limits);

        assert!(!limiter.is_limited("a"));
        assert!(!limiter.is_limited("b"));
    }
}
