//! TTL cache with FIFO eviction over live entries
//!
//! Entries carry an absolute `expires_at` and a monotonically increasing
//! insertion sequence. Eviction always removes the entry with the smallest
//! sequence; lookups never touch the sequence, so reads do not extend an
//! entry's life. Expired entries are dropped lazily by `get`, eagerly by
//! `purge_expired`, and before any live entry is evicted to make room.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::config::CacheConfig;
use super::stats::{CacheStats, Counters};
use crate::resilience::{Clock, SystemClock};

/// TTLs are clamped to this so `now + ttl` stays representable
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    insertion_order: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Storage<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// insertion_order -> key, oldest first
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K, V> Storage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self { entries: HashMap::new(), order: BTreeMap::new(), next_seq: 0 }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.insertion_order);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> u64 {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len() as u64
    }

    /// Drop the oldest entries until `len <= capacity`
    fn evict_to(&mut self, capacity: usize) -> u64 {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            let Some((_, key)) = self.order.pop_first() else { break };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe result cache with per-entry TTL and a capacity bound
///
/// Clones share storage and counters.
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use healer_common::cache::{Cache, CacheConfig};
///
/// let cache: Cache<String, String> = Cache::new(CacheConfig::bounded(2, Duration::from_secs(60)));
/// cache.insert("a".to_string(), "first".to_string());
/// cache.insert("b".to_string(), "second".to_string());
/// cache.insert("c".to_string(), "third".to_string());
///
/// assert_eq!(cache.get(&"a".to_string()), None);
/// assert_eq!(cache.get(&"c".to_string()).as_deref(), Some("third"));
/// ```
pub struct Cache<K, V, C = SystemClock>
where
    C: Clock,
{
    storage: Arc<RwLock<Storage<K, V>>>,
    config: CacheConfig,
    counters: Arc<Counters>,
    clock: Arc<C>,
}

impl<K, V, C: Clock> Clone for Cache<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K, V, C> fmt::Debug for Cache<K, V, C>
where
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("len", &self.storage.read().entries.len())
            .finish()
    }
}

impl<K, V> Cache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache using the system clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Create a cache with a custom clock (useful for testing)
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            storage: Arc::new(RwLock::new(Storage::new())),
            config,
            counters: Arc::new(Counters::default()),
            clock: Arc::new(clock),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`.
    ///
    /// Returns `None` for absent or expired keys; an expired entry is
    /// removed on the way out. Does not refresh the entry's position.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();

        let expired_seq = {
            let storage = self.storage.read();
            match storage.entries.get(key) {
                None => {
                    self.record(Counters::miss);
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    let value = entry.value.clone();
                    self.record(Counters::hit);
                    return Some(value);
                }
                Some(entry) => entry.insertion_order,
            }
        };

        // Re-check under the write lock: the key may have been overwritten
        // between dropping the read guard and taking this one.
        let mut storage = self.storage.write();
        let still_expired = storage
            .entries
            .get(key)
            .is_some_and(|entry| entry.insertion_order == expired_seq);
        if still_expired {
            storage.remove(key);
            drop(storage);
            if self.config.track_metrics {
                self.counters.expired(1);
            }
        }
        self.record(Counters::miss);
        None
    }

    /// Insert with the configured default TTL
    pub fn insert(&self, key: K, value: V) {
        self.set(key, value, self.config.default_ttl);
    }

    /// Insert or overwrite `key`, expiring after `ttl`.
    ///
    /// The entry gets a fresh insertion order. If the cache then holds more
    /// than `capacity` entries, expired entries are purged first and the
    /// oldest live entries are evicted until the bound holds.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now);

        let (expired, evicted) = {
            let mut storage = self.storage.write();
            storage.remove(&key);

            let insertion_order = storage.next_seq;
            storage.next_seq += 1;
            storage.order.insert(insertion_order, key.clone());
            storage.entries.insert(key, CacheEntry { value, expires_at, insertion_order });

            if storage.entries.len() > self.config.capacity {
                let expired = storage.purge_expired(now);
                (expired, storage.evict_to(self.config.capacity))
            } else {
                (0, 0)
            }
        };

        if self.config.track_metrics {
            self.counters.insert();
            self.counters.expired(expired);
            self.counters.evicted(evicted);
        }
    }

    /// Return the cached value or compute, store (default TTL) and return it
    ///
    /// `f` runs outside the lock; concurrent callers racing on the same
    /// missing key may each compute, and the last `set` wins.
    pub fn get_or_insert_with<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = f();
        self.insert(key, value.clone());
        value
    }

    /// Remove `key`, returning its value if it was live
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entry = self.storage.write().remove(key)?;
        (!entry.is_expired(now)).then_some(entry.value)
    }

    /// Drop every entry and reset counters
    pub fn clear(&self) {
        let mut storage = self.storage.write();
        storage.entries.clear();
        storage.order.clear();
        drop(storage);
        self.counters.reset();
    }

    /// Stored entries, including expired ones not yet removed
    pub fn len(&self) -> usize {
        self.storage.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that have not expired
    pub fn live_len(&self) -> usize {
        let now = self.clock.now();
        self.storage.read().entries.values().filter(|entry| !entry.is_expired(now)).count()
    }

    /// Remove every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.storage.write().purge_expired(now);
        if self.config.track_metrics {
            self.counters.expired(removed);
        }
        usize::try_from(removed).unwrap_or(usize::MAX)
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.config.capacity)
    }

    fn record(&self, f: fn(&Counters)) {
        if self.config.track_metrics {
            f(&self.counters);
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::core.

    use std::thread;

    use super::*;
    use crate::resilience::MockClock;

    fn cache(capacity: usize, ttl: Duration) -> (Cache<String, u32, MockClock>, MockClock) {
        let clock = MockClock::new();
        let cache = Cache::with_clock(CacheConfig::bounded(capacity, ttl), clock.clone());
        (cache, clock)
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    /// Validates FIFO eviction with capacity 3 and five inserts.
    ///
    /// Assertions:
    /// - The first two keys are gone.
    /// - The last three keys are retrievable.
    #[test]
    fn test_fifo_eviction() {
        let (cache, _clock) = cache(3, Duration::from_secs(60));
        for (i, k) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            cache.insert(key(k), i as u32);
            assert!(cache.len() <= 3);
        }

        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.get(&key("c")), Some(2));
        assert_eq!(cache.get(&key("e")), Some(4));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_get_does_not_refresh_order() {
        let (cache, _clock) = cache(2, Duration::from_secs(60));
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        assert_eq!(cache.get(&key("a")), Some(1));

        cache.insert(key("c"), 3);
        assert_eq!(cache.get(&key("a")), None, "reads must not protect an entry");
        assert_eq!(cache.get(&key("b")), Some(2));
    }

    #[test]
    fn test_overwrite_takes_new_insertion_order() {
        let (cache, _clock) = cache(2, Duration::from_secs(60));
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        cache.insert(key("a"), 10);
        assert_eq!(cache.len(), 2);

        cache.insert(key("c"), 3);
        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.get(&key("a")), Some(10));
    }

    #[test]
    fn test_expiry_is_lazy_and_exact() {
        let (cache, clock) = cache(10, Duration::from_secs(60));
        cache.set(key("k"), 1, Duration::from_secs(5));

        clock.advance(Duration::from_millis(4999));
        assert_eq!(cache.get(&key("k")), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("k")), None);
        assert_eq!(cache.len(), 0, "expired entry removed by get");
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_expired_entries_purged_before_live_eviction() {
        let (cache, clock) = cache(2, Duration::from_secs(60));
        cache.set(key("short"), 1, Duration::from_secs(1));
        cache.set(key("long"), 2, Duration::from_secs(60));

        clock.advance(Duration::from_secs(2));
        cache.insert(key("new"), 3);

        assert_eq!(cache.get(&key("long")), Some(2));
        assert_eq!(cache.get(&key("new")), Some(3));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let (cache, _clock) = cache(0, Duration::from_secs(60));
        cache.insert(key("a"), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let (cache, clock) = cache(1, Duration::from_secs(60));
        cache.set(key("forever"), 1, Duration::MAX);
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.get(&key("forever")), Some(1));
    }

    #[test]
    fn test_remove_clear_and_purge() {
        let (cache, clock) = cache(10, Duration::from_secs(60));
        cache.insert(key("a"), 1);
        cache.set(key("b"), 2, Duration::from_secs(1));
        cache.insert(key("c"), 3);

        assert_eq!(cache.remove(&key("a")), Some(1));
        assert_eq!(cache.remove(&key("a")), None);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.live_len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().inserts, 0);
    }

    #[test]
    fn test_get_or_insert_with() {
        let (cache, _clock) = cache(10, Duration::from_secs(60));
        assert_eq!(cache.get_or_insert_with(key("k"), || 5), 5);
        assert_eq!(cache.get_or_insert_with(key("k"), || unreachable!("cached")), 5);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_metrics_disabled() {
        let config = CacheConfig::builder().capacity(1).track_metrics(false).build().unwrap();
        let cache: Cache<String, u32> = Cache::new(config);
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        let _ = cache.get(&key("b"));
        assert_eq!(cache.stats(), CacheStats { size: 1, capacity: 1, ..Default::default() });
    }

    #[test]
    fn test_concurrent_sets_respect_capacity() {
        let cache: Cache<String, usize> =
            Cache::new(CacheConfig::bounded(16, Duration::from_secs(60)));

        thread::scope(|scope| {
            for t in 0..8 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        cache.insert(format!("{t}-{i}"), i);
                        let _ = cache.get(&format!("{t}-{}", i / 2));
                        assert!(cache.len() <= 16);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 16);
        let stats = cache.stats();
        assert_eq!(stats.inserts, 1600);
        assert_eq!(stats.evictions, 1600 - 16);
    }
}
