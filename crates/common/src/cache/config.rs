//! Cache configuration and builder

use std::time::Duration;

use crate::config::CacheSettings;
use crate::error::{CommonError, CommonResult};

/// Configuration for [`super::Cache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries; zero means nothing is retained
    pub capacity: usize,

    /// TTL used by `Cache::insert`
    pub default_ttl: Duration,

    /// Whether to collect hit/miss/eviction counters
    pub track_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000, default_ttl: Duration::from_secs(3600), track_metrics: true }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            capacity: settings.capacity,
            default_ttl: settings.default_ttl,
            track_metrics: settings.track_metrics,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Preset: `capacity` entries living for `ttl`, metrics on
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use healer_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::bounded(128, Duration::from_secs(600));
    /// assert_eq!(config.capacity, 128);
    /// ```
    pub fn bounded(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, default_ttl: ttl, track_metrics: true }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.default_ttl.is_zero() {
            return Err(CommonError::config_field("default_ttl", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`CacheConfig`]
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn track_metrics(mut self, enabled: bool) -> Self {
        self.config.track_metrics = enabled;
        self
    }

    pub fn build(self) -> CommonResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
