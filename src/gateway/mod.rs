//! Outbound call infrastructure: per-upstream throttling and the staleness cache

pub mod cache;
pub mod rate_limiter;

pub use cache::{CacheStats, StalenessCache, DEFAULT_CACHE_CAPACITY};
pub use rate_limiter::{BucketConfig, RateLimiter};
