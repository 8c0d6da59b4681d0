//! Cancellable retry with backoff
//!
//! [`retry_with_backoff`] is the plain contract used by most callers: up to
//! `max_attempts` invocations, delays doubling from `base_delay`, and a
//! [`CancellationToken`] that stops both a pending wait and the next
//! attempt. [`RetryExecutor`] is the configurable form, driven by a
//! [`RetryConfig`] (backoff strategy, delay cap, jitter) and a
//! [`RetryPolicy`] deciding which errors are worth another attempt.
//!
//! The backoff wait is the only suspension point in the resilience layer and
//! it is always raced against the token.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::{JitterMode, RetrySettings};
use crate::error::{CommonError, CommonResult, ErrorKind};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The cancellation token fired before an attempt or during a wait
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Every attempt failed; carries the last observed error
    #[error("all {attempts} attempt(s) exhausted: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The retry policy refused to retry this error
    #[error("non-retryable error after {attempts} attempt(s): {source}")]
    NonRetryable {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The retry configuration is invalid
    #[error("invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Exhausted { .. } | Self::NonRetryable { .. } => ErrorKind::Operation,
            Self::InvalidConfiguration { .. } => ErrorKind::Config,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Cancelled { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. } => *attempts,
            Self::InvalidConfiguration { .. } => 0,
        }
    }

    /// The last operation error, if the operation ran and failed
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// `attempt` is the 1-based number of the attempt that just failed
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry after a specific delay
    RetryAfter(Duration),
    /// Give up and surface the error
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial_delay + retry * increment`
    Linear { initial_delay: Duration, increment: Duration },
    /// `initial_delay * base^retry`
    Exponential { initial_delay: Duration, base: f64 },
}

impl BackoffStrategy {
    /// Delay before retry number `retry` (0 for the wait after the first
    /// failure). Saturates instead of overflowing.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(retry))
            }
            Self::Exponential { initial_delay, .. } if initial_delay.is_zero() => Duration::ZERO,
            Self::Exponential { initial_delay, base } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = initial_delay.as_secs_f64() * base.powi(exponent);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
        }
    }
}

/// Randomisation applied to computed delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`
    Equal,
}

impl Jitter {
    pub fn apply(self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_millis(delay)),
            Self::Equal => {
                let half = delay / 2;
                half.saturating_add(Duration::from_millis(random_millis(half)))
            }
        }
    }
}

impl From<JitterMode> for Jitter {
    fn from(mode: JitterMode) -> Self {
        match mode {
            JitterMode::None => Self::None,
            JitterMode::Full => Self::Full,
            JitterMode::Equal => Self::Equal,
        }
    }
}

fn random_millis(max: Duration) -> u64 {
    let max = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of invocations, including the first
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Upper bound on any single delay, applied before jitter
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                base: 2.0,
            },
            max_delay: Duration::from_secs(30),
            jitter: Jitter::None,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: BackoffStrategy::Exponential { initial_delay: settings.base_delay, base: 2.0 },
            max_delay: settings.max_delay,
            jitter: settings.jitter.into(),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.max_attempts == 0 {
            return Err(CommonError::config_field("max_attempts", "must be greater than 0"));
        }
        if let BackoffStrategy::Exponential { base, .. } = self.backoff {
            if !base.is_finite() || base < 1.0 {
                return Err(CommonError::config_field(
                    "backoff.base",
                    format!("must be a finite value >= 1.0, got {base}"),
                ));
            }
        }
        Ok(())
    }

    /// Delay to wait after the failure of attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.calculate_delay(attempt.saturating_sub(1)).min(self.max_delay);
        self.jitter.apply(delay)
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(mut self, initial_delay: Duration, base: f64) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base };
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> CommonResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an operation until it succeeds, the policy stops it, attempts run
/// out, or the token is cancelled
#[derive(Debug, Clone)]
pub struct RetryExecutor<P = policies::AlwaysRetry> {
    name: String,
    config: RetryConfig,
    policy: P,
}

impl RetryExecutor<policies::AlwaysRetry> {
    /// Executor that retries every error
    pub fn with_config(config: RetryConfig) -> Self {
        Self::new(config, policies::AlwaysRetry)
    }
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { name: "operation".to_string(), config, policy }
    }

    /// Name the operation in logs and errors
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation` with retries.
    ///
    /// The token is checked before every attempt, so a cancelled token never
    /// lets an attempt start, and it interrupts any backoff wait.
    #[instrument(
        skip(self, token, operation),
        fields(operation = %self.name, max_attempts = self.config.max_attempts)
    )]
    pub async fn execute<F, Fut, T, E>(
        &self,
        token: &CancellationToken,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if token.is_cancelled() {
            debug!("cancelled before first attempt");
            return Err(RetryError::Cancelled { attempts: 0 });
        }
        if self.config.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            if token.is_cancelled() {
                debug!(attempts = attempt, "cancelled before next attempt");
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= self.config.max_attempts {
                warn!(attempts = attempt, error = %error, "retry attempts exhausted");
                return Err(RetryError::Exhausted { attempts: attempt, source: error });
            }

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempts = attempt, error = %error, "retry policy stopped");
                    return Err(RetryError::NonRetryable { attempts: attempt, source: error });
                }
                RetryDecision::Retry => self.config.delay_for(attempt),
                RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(attempt, ?delay, error = %error, "attempt failed, backing off");

            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(attempts = attempt, "cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Retry `operation` up to `max_attempts` times with exponential backoff
/// starting at `base_delay` (doubling each retry, no jitter).
///
/// # Errors
/// - `RetryError::Cancelled` if `token` is cancelled before an attempt or
///   during a wait (the operation is never invoked on an already-cancelled
///   token)
/// - `RetryError::Exhausted` carrying the last error once attempts run out
/// - `RetryError::InvalidConfiguration` when `max_attempts` is zero and
///   the token is not cancelled
pub async fn retry_with_backoff<F, Fut, T, E>(
    token: &CancellationToken,
    operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> RetryResult<T, E>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let config = RetryConfig {
        max_attempts,
        backoff: BackoffStrategy::Exponential { initial_delay: base_delay, base: 2.0 },
        max_delay: Duration::MAX,
        jitter: Jitter::None,
    };
    RetryExecutor::with_config(config).execute(token, operation).await
}

/// Pre-defined retry policies
pub mod policies {
    use super::*;
    use crate::error::ErrorClassification;

    /// Retry on any error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retry
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retry while a predicate over `(error, attempt)` holds
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    /// Retry errors that classify themselves as retryable, honouring any
    /// `retry_after` hint they carry
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            match error.retry_after() {
                Some(delay) => RetryDecision::RetryAfter(delay),
                None => RetryDecision::Retry,
            }
        }
    }
}
