//! Cache statistics
//!
//! Counters are plain atomics updated outside the storage lock; a snapshot
//! is therefore approximate under concurrent use but never torn per field.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored (expired entries not yet purged included)
    pub size: usize,

    /// Configured capacity
    pub capacity: usize,

    /// `get` calls that returned a value
    pub hits: u64,

    /// `get` calls for absent or expired keys
    pub misses: u64,

    /// `set`/`insert` calls
    pub inserts: u64,

    /// Live entries dropped to respect capacity
    pub evictions: u64,

    /// Expired entries removed (lazily or by a purge)
    pub expirations: u64,
}

impl CacheStats {
    /// Hits over total lookups, 0.0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of capacity in use
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.size as f64 / self.capacity as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn expired(&self, count: u64) {
        if count > 0 {
            self.expirations.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, size: usize, capacity: usize) -> CacheStats {
        CacheStats {
            size,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in
            [&self.hits, &self.misses, &self.inserts, &self.evictions, &self.expirations]
        {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
