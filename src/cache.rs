use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Occupancy snapshot reported by `/cachestats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded cache whose entries expire after a time-to-live.
///
/// Recency is refreshed by `get` and `set`. Inserting a new key while full
/// evicts the least recently used entry. Expired entries are dropped lazily
/// when touched, or in bulk by `clean_expired`.
pub struct TtlCache<V> {
    entries: LruCache<String, Entry<V>>,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        if !self.check_fresh(key) {
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set_with_ttl(key, value, ttl);
    }

    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let key = key.into();
        let is_new = !self.entries.contains(&key);
        if let Some((evicted, _)) = self.entries.push(key, entry) {
            if is_new {
                debug!("Cache: evicted least recently used key {}", evicted);
            }
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Freshness check without returning the value or touching recency.
    pub fn exists(&mut self, key: &str) -> bool {
        self.check_fresh(key)
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn clean_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key.as_str());
        }
        expired.len()
    }

    /// Keys currently held, most recently used first.
    pub fn get_keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    // Drops the entry if it has expired. Returns whether a live entry remains.
    fn check_fresh(&mut self, key: &str) -> bool {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => return false,
        };
        if expired {
            self.entries.pop(key);
            return false;
        }
        true
    }
}

/// Thread-safe handle over a [`TtlCache`], cloned into every API client.
pub struct SharedCache<V> {
    inner: Arc<Mutex<TtlCache<V>>>,
}

impl<V> Clone for SharedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> SharedCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TtlCache::new(max_size, default_ttl))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TtlCache<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.lock().set(key, value);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.lock().set_with_ttl(key, value, ttl);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().delete(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.lock().exists(key)
    }

    pub fn clean_expired(&self) -> usize {
        self.lock().clean_expired()
    }

    pub fn get_keys(&self) -> Vec<String> {
        self.lock().get_keys()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn cache(max_size: usize) -> TtlCache<i32> {
        TtlCache::new(max_size, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_last_value_set() {
        let mut cache = cache(4);
        cache.set("a", 1);
        cache.set("a", 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.get("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent_and_removed() {
        let mut cache = cache(4);
        cache.set_with_ttl("a", 1, Duration::from_secs(1));
        advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("a"), None);
        assert!(!cache.get_keys().contains(&"a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_deadline() {
        let mut cache = cache(4);
        cache.set_with_ttl("a", 1, Duration::from_secs(10));
        advance(Duration::from_secs(9)).await;
        assert!(cache.exists("a"));
        advance(Duration::from_secs(1)).await;
        assert!(!cache.exists("a"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_respects_get_refresh() {
        let mut cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let mut cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("a"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_expired_removes_only_expired() {
        let mut cache = cache(8);
        cache.set_with_ttl("short1", 1, Duration::from_secs(5));
        cache.set_with_ttl("short2", 2, Duration::from_secs(5));
        cache.set_with_ttl("long", 3, Duration::from_secs(500));
        advance(Duration::from_secs(10)).await;

        assert_eq!(cache.clean_expired(), 2);
        assert_eq!(cache.get_keys(), vec!["long".to_string()]);
        assert_eq!(cache.clean_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exists_does_not_refresh_recency() {
        let mut cache = cache(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.exists("a"));
        cache.set("c", 3);

        assert!(!cache.exists("a"));
        assert!(cache.exists("b"));
        assert!(cache.exists("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exists_and_get_agree_on_expiry() {
        let mut cache = cache(4);
        cache.set_with_ttl("a", 1, Duration::from_secs(5));
        cache.set_with_ttl("b", 2, Duration::from_secs(5));
        advance(Duration::from_secs(5)).await;

        assert!(!cache.exists("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert!(!cache.exists("b"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_never_exceeds_capacity() {
        let mut cache = cache(5);
        for i in 0..200 {
            cache.set(format!("key{}", i % 37), i);
            if i % 3 == 0 {
                let _ = cache.get(&format!("key{}", (i * 7) % 37));
            }
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.stats().capacity, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_reports_presence() {
        let mut cache = cache(2);
        cache.set("a", 1);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_shared_handle() {
        let shared: SharedCache<i32> = SharedCache::new(3, Duration::from_secs(30));
        let other = shared.clone();
        shared.set("x", 7);
        assert_eq!(other.get("x"), Some(7));
        assert_eq!(other.get("y"), None);

        let stats = shared.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
