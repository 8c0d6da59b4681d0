//! Result cache with TTL expiry and a capacity bound
//!
//! Maps an opaque key (usually a [`fingerprint`] of a request) to a
//! previously computed result. Two rules govern retention:
//!
//! - **TTL**: an entry set with TTL `t` is returned until `t` has elapsed
//!   and never afterwards; expired entries are removed lazily.
//! - **Capacity**: after every `set`, at most `capacity` entries remain.
//!   Eviction is FIFO by insertion order over live entries; `get` does not
//!   refresh an entry.
//!
//! # Features
//!
//! - **Thread-safe**: one `parking_lot::RwLock` guards entries and order;
//!   lookups of live entries only take the read lock
//! - **Testable**: time comes from a [`Clock`](crate::resilience::Clock)
//! - **Metrics**: optional hit/miss/insert/eviction/expiration counters
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use healer_common::cache::{fingerprint, Cache, CacheConfig};
//!
//! let cache: Cache<String, String> = Cache::new(CacheConfig::default());
//! let key = fingerprint(["gemini", "summarize", "build log"]);
//!
//! let diagnosis = cache.get_or_insert_with(key.clone(), || "missing dependency".to_string());
//! assert_eq!(cache.get(&key), Some(diagnosis));
//!
//! cache.set("short-lived".to_string(), "x".to_string(), Duration::from_millis(10));
//! println!("hit rate: {:.2}", cache.stats().hit_rate());
//! ```

mod config;
mod core;
mod fingerprint;
mod stats;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use self::core::Cache;
pub use fingerprint::fingerprint;
pub use stats::CacheStats;
