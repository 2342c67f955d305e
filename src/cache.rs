//! In-process expiring cache for pipeline results.
//!
//! Entries expire after a fixed TTL and the store holds at most `capacity`
//! keys; when a new key arrives at capacity the oldest-inserted key is
//! dropped. Overwriting a key keeps its original insertion slot.
//!
//! There is no single-flight: two concurrent misses on the same key both run
//! their producer and the later write wins.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default time-to-live for cached values.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fallback lifetime when the configured TTL cannot be added to the clock.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Default maximum number of cached keys.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Time source, injectable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Key/value store the pipelines memoize through.
pub trait CacheStore<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<T>;
    fn set(&self, key: &str, value: T);
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    order: VecDeque<String>,
}

/// Bounded FIFO cache with per-entry expiry
pub struct TtlCache<T> {
    inner: Mutex<Inner<T>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl<T: Clone + Send> TtlCache<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        // a panic while holding the lock leaves the maps consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl<T: Clone + Send> CacheStore<T> for TtlCache<T> {
    fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            log::debug!("Cache entry expired: {}", key);
        }
        None
    }

    fn set(&self, key: &str, value: T) {
        let now = self.clock.now();
        let expires_at = now.checked_add(self.ttl).unwrap_or_else(|| {
            log::warn!("Cache TTL {:?} overflows the clock; clamping to {:?}", self.ttl, MAX_TTL);
            now.checked_add(MAX_TTL).unwrap_or(now)
        });
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else { break };
            inner.entries.remove(&oldest);
            log::debug!("Cache evicted oldest entry: {}", oldest);
        }

        inner.order.push_back(key.to_string());
        inner.entries.insert(key.to_string(), CacheEntry { value, expires_at });
    }
}

/// Return the cached value for `key`, or run `producer` and cache its `Ok` value.
pub async fn with_cache<T, E, F, Fut>(store: &dyn CacheStore<T>, key: &str, producer: F) -> Result<T, E>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = store.get(key) {
        log::debug!("Cache hit: {}", key);
        return Ok(hit);
    }
    let value = producer().await?;
    store.set(key, value.clone());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Clock advanced by hand
    struct ManualClock {
        start: Instant,
        offset_secs: AtomicU64,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self { start: Instant::now(), offset_secs: AtomicU64::new(0) })
        }

        fn advance(&self, secs: u64) {
            self.offset_secs.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + Duration::from_secs(self.offset_secs.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache: TtlCache<String> = TtlCache::default();
        cache.set("a", "1".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let clock = ManualClock::new();
        let cache: TtlCache<u32> = TtlCache::with_clock(Duration::from_secs(60), 10, clock.clone());
        cache.set("k", 7);
        clock.advance(59);
        assert_eq!(cache.get("k"), Some(7));
        clock.advance(1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_ttl_does_not_overflow() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::MAX, 4);
        cache.set("k", 1);
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let cache: TtlCache<usize> = TtlCache::new(DEFAULT_TTL, 3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.set(key, i);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("d"), Some(3));
    }

    #[test]
    fn test_overwrite_keeps_insertion_slot() {
        let cache: TtlCache<usize> = TtlCache::new(DEFAULT_TTL, 2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_default_capacity_bound() {
        let cache: TtlCache<usize> = TtlCache::default();
        for i in 0..=DEFAULT_CAPACITY {
            cache.set(&format!("k{i}"), i);
        }
        assert_eq!(cache.len(), DEFAULT_CAPACITY);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get(&format!("k{DEFAULT_CAPACITY}")), Some(DEFAULT_CAPACITY));
    }

    #[tokio::test]
    async fn test_with_cache_runs_producer_once() {
        let cache: TtlCache<String> = TtlCache::default();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value: Result<String, String> = with_cache(&cache, "/api/manga?page=1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("payload".to_string())
            })
            .await;
            assert_eq!(value.unwrap(), "payload");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_cache_does_not_store_errors() {
        let cache: TtlCache<String> = TtlCache::default();
        let first: Result<String, &str> = with_cache(&cache, "k", || async { Err("boom") }).await;
        assert!(first.is_err());
        assert!(cache.is_empty());

        let second: Result<String, &str> = with_cache(&cache, "k", || async { Ok("ok".to_string()) }).await;
        assert_eq!(second.unwrap(), "ok");
        assert_eq!(cache.get("k").as_deref(), Some("ok"));
    }
}
