//! Fixed-window token bucket
//!
//! The limiter holds `capacity` tokens. Each admission consumes one. Once a
//! full `window` has elapsed since the window started, the next admission
//! check resets the pool to `capacity` in one step (full-bucket refill, no
//! continuous trickle). Admission never blocks; callers that want to wait
//! poll or sleep on the `retry_after` reported by [`RateLimiter::check`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Clock, ResilienceError, ResilienceResult, SystemClock};
use crate::config::RateLimitSettings;
use crate::error::{CommonError, CommonResult};

/// Configuration for [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Name of the protected resource, used in errors and logs
    pub name: String,
    /// Tokens available per window
    pub capacity: u64,
    /// Length of one refill window
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { name: "default".to_string(), capacity: 60, window: Duration::from_secs(60) }
    }
}

impl From<&RateLimitSettings> for RateLimiterConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self { capacity: settings.capacity, window: settings.window, ..Self::default() }
    }
}

impl RateLimiterConfig {
    /// Create a configuration builder
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::config_field("capacity", "must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(CommonError::config_field("window", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`RateLimiterConfig`]
#[derive(Debug, Default)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    pub fn build(self) -> CommonResult<RateLimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Token pool state. Invariant: `tokens_remaining <= capacity`.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens_remaining: u64,
    window_start: Instant,
}

impl Bucket {
    fn full(capacity: u64, now: Instant) -> Self {
        Self { tokens_remaining: capacity, window_start: now }
    }

    /// Reset the pool if a full window has elapsed at `now`.
    fn refill(&mut self, now: Instant, capacity: u64, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.tokens_remaining = capacity;
            self.window_start = now;
        }
    }

    fn try_take(&mut self) -> bool {
        if self.tokens_remaining > 0 {
            self.tokens_remaining -= 1;
            true
        } else {
            false
        }
    }

    fn until_refill(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.window_start))
    }
}

/// Non-blocking rate limiter for one protected resource
///
/// Clones share the same token pool.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use healer_common::resilience::{RateLimiter, RateLimiterConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RateLimiterConfig::builder()
///     .name("github")
///     .capacity(2)
///     .window(Duration::from_secs(1))
///     .build()?;
/// let limiter = RateLimiter::new(config)?;
///
/// assert!(limiter.allow());
/// assert!(limiter.allow());
/// assert!(!limiter.allow());
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    bucket: Arc<Mutex<Bucket>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("available_tokens", &self.available_tokens())
            .finish()
    }
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            bucket: Arc::clone(&self.bucket),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter using the system clock
    pub fn new(config: RateLimiterConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter with a custom clock
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        let bucket = Bucket::full(config.capacity, clock.now());
        Ok(Self { config, bucket: Arc::new(Mutex::new(bucket)), clock: Arc::new(clock) })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Try to take one token. Returns `false` without blocking when the
    /// current window is exhausted.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.config.capacity, self.config.window);
        let allowed = bucket.try_take();
        drop(bucket);

        if !allowed {
            debug!(limiter = %self.config.name, "rate limit reached");
        }
        allowed
    }

    /// Like [`RateLimiter::allow`] but reports a `RateLimited` error carrying
    /// the time left until the next refill.
    pub fn check<E>(&self) -> ResilienceResult<(), E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.config.capacity, self.config.window);
        if bucket.try_take() {
            return Ok(());
        }
        let retry_after = bucket.until_refill(now, self.config.window);
        drop(bucket);

        warn!(
            limiter = %self.config.name,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "rejecting call: rate limit exceeded"
        );
        Err(ResilienceError::RateLimited {
            name: self.config.name.clone(),
            capacity: self.config.capacity,
            window: self.config.window,
            retry_after,
        })
    }

    /// Tokens left in the current window (after applying any due refill)
    pub fn available_tokens(&self) -> u64 {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.config.capacity, self.config.window);
        bucket.tokens_remaining
    }

    /// Refill the pool and start a new window now
    pub fn reset(&self) {
        *self.bucket.lock() = Bucket::full(self.config.capacity, self.clock.now());
    }
}
