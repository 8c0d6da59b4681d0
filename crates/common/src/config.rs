//! Healer configuration
//!
//! One TOML file configures every resilience primitive. All sections are
//! optional; a missing section or field falls back to its default, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [cache]
//! capacity = 500
//! default_ttl_ms = 600000
//!
//! [rate_limit]
//! capacity = 30
//! window_ms = 60000
//!
//! [retry]
//! max_attempts = 4
//! base_delay_ms = 250
//! jitter = "equal"
//! ```
//!
//! ## Environment Variables
//! Applied on top of the file by [`HealerConfig::apply_env_overrides`]:
//! - `HEALER_CACHE_CAPACITY`, `HEALER_CACHE_DEFAULT_TTL_MS`
//! - `HEALER_RATE_LIMIT_CAPACITY`, `HEALER_RATE_LIMIT_WINDOW_MS`
//! - `HEALER_CIRCUIT_BREAKER_FAILURE_THRESHOLD`,
//!   `HEALER_CIRCUIT_BREAKER_RESET_TIMEOUT_MS`
//! - `HEALER_RETRY_MAX_ATTEMPTS`, `HEALER_RETRY_BASE_DELAY_MS`,
//!   `HEALER_RETRY_MAX_DELAY_MS`, `HEALER_RETRY_JITTER`
//! - `HEALER_LIMITS_MAX_LOG_SIZE`, `HEALER_LIMITS_CHUNK_SIZE`
//! - `HEALER_LOG_LEVEL`, `HEALER_LOG_JSON`

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};
use crate::utils::serde::duration_millis;
use crate::validation::{validate_with_limit, ValidationResult, MAX_LOG_SIZE};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "HEALER_";

/// Aggregate configuration for the resilience layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerConfig {
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
    pub limits: LimitSettings,
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of live entries
    pub capacity: usize,
    /// TTL applied by `Cache::insert`
    #[serde(rename = "default_ttl_ms", with = "duration_millis")]
    pub default_ttl: Duration,
    pub track_metrics: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 1000, default_ttl: Duration::from_secs(3600), track_metrics: true }
    }
}

/// Rate limiter settings (full-bucket refill once per window)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u64,
    #[serde(rename = "window_ms", with = "duration_millis")]
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { capacity: 60, window: Duration::from_secs(60) }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    #[serde(rename = "reset_timeout_ms", with = "duration_millis")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout: Duration::from_secs(30) }
    }
}

/// Jitter applied to computed backoff delays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    /// Use the computed delay as-is
    #[default]
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`
    Equal,
}

impl FromStr for JitterMode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "equal" => Ok(Self::Equal),
            other => Err(CommonError::config_field(
                "retry.jitter",
                format!("unknown jitter mode '{other}' (expected none, full or equal)"),
            )),
        }
    }
}

/// Retry/backoff settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    pub jitter: JitterMode,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: JitterMode::None,
        }
    }
}

/// Logging settings consumed by `observability::init_tracing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Ingestion limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Upper bound for a single validated log or text input, in bytes
    pub max_log_size: usize,
    /// Chunk size used when streaming logs, in bytes
    pub chunk_size: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self { max_log_size: MAX_LOG_SIZE, chunk_size: 64 * 1024 }
    }
}

impl LimitSettings {
    /// Run the validation gate with the configured `max_log_size`
    pub fn validate_input(&self, input: &str) -> ValidationResult<String> {
        validate_with_limit(input, self.max_log_size)
    }
}

impl HealerConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// # Errors
    /// Returns `CommonError::Serialization` for malformed TOML and
    /// `CommonError::Config` when a value fails validation.
    pub fn from_toml_str(text: &str) -> CommonResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CommonError::serialization_format("TOML", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, apply `HEALER_*` overrides, and validate.
    ///
    /// # Errors
    /// Returns `CommonError::Persistence` when the file cannot be read, plus
    /// everything [`HealerConfig::from_toml_str`] can return.
    pub fn load(path: impl AsRef<Path>) -> CommonResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CommonError::persistence_op("read_config", format!("{}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| CommonError::serialization_format("TOML", e.to_string()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    /// Returns `CommonError::Config` naming the variable when a value does
    /// not parse.
    pub fn apply_env_overrides(&mut self) -> CommonResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment, test map).
    ///
    /// Keys are full variable names, e.g. `HEALER_RETRY_MAX_ATTEMPTS`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> CommonResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("CACHE_CAPACITY") {
            self.cache.capacity = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("CACHE_DEFAULT_TTL_MS") {
            self.cache.default_ttl = Duration::from_millis(parse_var(&key, &value)?);
        }
        if let Some((key, value)) = var("RATE_LIMIT_CAPACITY") {
            self.rate_limit.capacity = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window = Duration::from_millis(parse_var(&key, &value)?);
        }
        if let Some((key, value)) = var("CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
            self.circuit_breaker.failure_threshold = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("CIRCUIT_BREAKER_RESET_TIMEOUT_MS") {
            self.circuit_breaker.reset_timeout = Duration::from_millis(parse_var(&key, &value)?);
        }
        if let Some((key, value)) = var("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("RETRY_BASE_DELAY_MS") {
            self.retry.base_delay = Duration::from_millis(parse_var(&key, &value)?);
        }
        if let Some((key, value)) = var("RETRY_MAX_DELAY_MS") {
            self.retry.max_delay = Duration::from_millis(parse_var(&key, &value)?);
        }
        if let Some((key, value)) = var("RETRY_JITTER") {
            self.retry.jitter = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("LIMITS_MAX_LOG_SIZE") {
            self.limits.max_log_size = parse_var(&key, &value)?;
        }
        if let Some((key, value)) = var("LIMITS_CHUNK_SIZE") {
            self.limits.chunk_size = parse_var(&key, &value)?;
        }
        if let Some((_, value)) = var("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some((key, value)) = var("LOG_JSON") {
            self.logging.json = parse_bool(&key, &value)?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `CommonError::Config` with the offending field path.
    pub fn validate(&self) -> CommonResult<()> {
        if self.cache.default_ttl.is_zero() {
            return Err(CommonError::config_field("cache.default_ttl_ms", "must be greater than 0"));
        }
        if self.rate_limit.capacity == 0 {
            return Err(CommonError::config_field("rate_limit.capacity", "must be greater than 0"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(CommonError::config_field("rate_limit.window_ms", "must be greater than 0"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "circuit_breaker.failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CommonError::config_field("retry.max_attempts", "must be greater than 0"));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(CommonError::config_field(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.limits.max_log_size == 0 {
            return Err(CommonError::config_field("limits.max_log_size", "must be greater than 0"));
        }
        if self.limits.chunk_size == 0 {
            return Err(CommonError::config_field("limits.chunk_size", "must be greater than 0"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(CommonError::config_field("logging.level", "cannot be empty"));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> CommonResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| CommonError::config_field(key, format!("invalid value '{value}': {e}")))
}

fn parse_bool(key: &str, value: &str) -> CommonResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CommonError::config_field(key, format!("invalid boolean '{value}'"))),
    }
}
