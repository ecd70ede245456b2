//! Staleness cache
//!
//! Bounded key/value store with per-entry expiry. Insertion order doubles as a
//! recency approximation: a hit is re-inserted at the most-recent end, and when
//! full the single oldest entry is evicted regardless of its TTL. Expired
//! entries are dropped lazily on read.
//!
//! This is a hint cache. A miss only costs a redundant upstream fetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default maximum number of entries
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> CacheInner<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn push(&mut self, key: String, value: V, expires_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                seq,
            },
        );
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Cache statistics for monitoring
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Bounded TTL cache shared by the services of one process
pub struct StalenessCache<V> {
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
    stats: CacheStats,
}

impl<V: Clone> StalenessCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            stats: CacheStats::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        // Poisoning only means a panic mid-update; the maps stay consistent per call
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a live entry, refreshing its recency
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let Some(entry) = inner.remove(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if entry.is_expired(now) {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let value = entry.value.clone();
        inner.push(key.to_string(), entry.value, entry.expires_at);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Insert or replace an entry
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut inner = self.lock();

        if inner.remove(key).is_none() && inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.evict_oldest() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %evicted, "Evicted oldest cache entry");
            }
        }
        inner.push(key.to_string(), value, expires_at);
    }

    /// Check for a key without touching recency (expired entries count as absent)
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<V: Clone> Default for StalenessCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_get_and_set() {
        let cache = StalenessCache::new(4);
        cache.set("a", 1u32, HOUR);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_expired_entries_are_absent() {
        let cache = StalenessCache::new(4);
        cache.set("stale", "v".to_string(), Duration::ZERO);

        assert!(!cache.contains("stale"));
        assert_eq!(cache.get("stale"), None);
        // Lazily removed on read
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_overflow_evicts_first_inserted() {
        let capacity = 5;
        let cache = StalenessCache::new(capacity);
        for i in 0..capacity {
            cache.set(&format!("k{}", i), i, HOUR);
        }

        cache.set("overflow", 99, HOUR);

        assert_eq!(cache.len(), capacity);
        assert!(!cache.contains("k0"));
        for i in 1..capacity {
            assert!(cache.contains(&format!("k{}", i)));
        }
        assert!(cache.contains("overflow"));
    }

    #[test]
    fn test_hit_refreshes_recency() {
        let cache = StalenessCache::new(3);
        cache.set("a", 1, HOUR);
        cache.set("b", 2, HOUR);
        cache.set("c", 3, HOUR);

        // "a" moves to the recent end, so "b" is now oldest
        assert_eq!(cache.get("a"), Some(1));
        cache.set("d", 4, HOUR);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let cache = StalenessCache::new(2);
        cache.set("a", 1, HOUR);
        cache.set("b", 2, HOUR);
        cache.set("a", 10, HOUR);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_default_capacity() {
        let cache: StalenessCache<u8> = StalenessCache::default();
        assert_eq!(cache.capacity(), 500);
        assert!(cache.is_empty());
    }
}
