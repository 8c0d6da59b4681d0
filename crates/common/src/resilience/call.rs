//! Rate limiter, circuit breaker and retry composed for one outbound resource
//!
//! Every call to an LLM provider or the source-control API goes through the
//! same three gates, in this order:
//!
//! 1. the [`RateLimiter`] admission check (rejects without waiting),
//! 2. the [`CircuitBreaker`] (rejects while open),
//! 3. the retry loop, whose whole run counts as one breaker call.
//!
//! A retry run that ends because the token was cancelled does not count as a
//! breaker failure.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    CircuitBreaker, CircuitBreakerConfig, Clock, RateLimiter, RateLimiterConfig, ResilienceError,
    ResilienceResult, RetryConfig, RetryError, RetryExecutor, SystemClock,
};
use crate::cache::Cache;
use crate::config::HealerConfig;
use crate::error::CommonResult;

/// The resilience stack for one named resource
#[derive(Debug, Clone)]
pub struct ResilientCall<C: Clock = SystemClock> {
    name: String,
    limiter: RateLimiter<C>,
    breaker: CircuitBreaker<C>,
    retry: RetryConfig,
}

impl ResilientCall<SystemClock> {
    /// Build the stack for `name` from the aggregate configuration
    pub fn from_config(name: impl Into<String>, config: &HealerConfig) -> CommonResult<Self> {
        let name = name.into();
        let limiter = RateLimiter::new(RateLimiterConfig {
            name: name.clone(),
            ..RateLimiterConfig::from(&config.rate_limit)
        })?;
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            name: name.clone(),
            ..CircuitBreakerConfig::from(&config.circuit_breaker)
        })?;
        let retry = RetryConfig::from(&config.retry);
        retry.validate()?;
        Ok(Self { name, limiter, breaker, retry })
    }
}

impl<C: Clock> ResilientCall<C> {
    pub fn new(
        name: impl Into<String>,
        limiter: RateLimiter<C>,
        breaker: CircuitBreaker<C>,
        retry: RetryConfig,
    ) -> Self {
        Self { name: name.into(), limiter, breaker, retry }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Run `operation` through limiter, breaker and retry.
    ///
    /// # Errors
    /// - `RateLimited` / `CircuitOpen` when a gate rejects the call (the
    ///   operation is not invoked)
    /// - `Cancelled` when `token` fires before or between attempts
    /// - `OperationFailed` wrapping the last operation error
    #[instrument(skip(self, token, operation), fields(resource = %self.name))]
    pub async fn call<F, Fut, T, E>(
        &self,
        token: &CancellationToken,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.limiter.check::<E>()?;

        let executor = RetryExecutor::with_config(self.retry.clone()).named(self.name.clone());
        self.breaker
            .execute_filtered(
                || executor.execute(token, operation),
                |error: &RetryError<E>| {
                    matches!(error, RetryError::Exhausted { .. } | RetryError::NonRetryable { .. })
                },
            )
            .await
            .map_err(|error| self.flatten(error))
    }

    /// Like [`ResilientCall::call`], serving and storing successes in
    /// `cache` under `key` (default TTL)
    pub async fn call_cached<F, Fut, T, E, CC>(
        &self,
        cache: &Cache<String, T, CC>,
        key: &str,
        token: &CancellationToken,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Clone,
        E: std::error::Error + Send + Sync + 'static,
        CC: Clock,
    {
        let key = key.to_string();
        if let Some(value) = cache.get(&key) {
            debug!(resource = %self.name, "served from cache");
            return Ok(value);
        }

        let value = self.call(token, operation).await?;
        cache.insert(key, value.clone());
        Ok(value)
    }

    fn flatten<E>(&self, error: ResilienceError<RetryError<E>>) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match error {
            ResilienceError::OperationFailed { source, .. } => match source {
                RetryError::Cancelled { attempts } => {
                    ResilienceError::Cancelled { operation: self.name.clone(), attempts }
                }
                RetryError::Exhausted { attempts, source }
                | RetryError::NonRetryable { attempts, source } => {
                    ResilienceError::OperationFailed {
                        operation: self.name.clone(),
                        attempts,
                        source,
                    }
                }
                RetryError::InvalidConfiguration { message } => {
                    ResilienceError::InvalidConfiguration { message }
                }
            },
            ResilienceError::CircuitOpen { name, retry_after } => {
                ResilienceError::CircuitOpen { name, retry_after }
            }
            ResilienceError::RateLimited { name, capacity, window, retry_after } => {
                ResilienceError::RateLimited { name, capacity, window, retry_after }
            }
            ResilienceError::Cancelled { operation, attempts } => {
                ResilienceError::Cancelled { operation, attempts }
            }
            ResilienceError::InvalidConfiguration { message } => {
                ResilienceError::InvalidConfiguration { message }
            }
        }
    }
}
