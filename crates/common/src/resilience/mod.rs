//! Resilience primitives for outbound calls
//!
//! The healer talks to LLM providers and to the source-control API, both of
//! which throttle, flap and time out. This module provides the pieces that
//! keep those calls bounded:
//!
//! - **Rate limiter**: fixed-window admission check that rejects instead of
//!   waiting
//! - **Circuit breaker**: Closed/Open/HalfOpen state machine with a single
//!   trial call while half-open
//! - **Retry**: attempt-bounded backoff that stops promptly on cancellation
//! - **Timeout scope**: a child cancellation token that fires after a
//!   duration
//! - **[`ResilientCall`]**: the three gates composed in the order every
//!   outbound call uses
//!
//! All time-dependent components read time through [`Clock`], so tests can
//! drive them with [`MockClock`].
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//!
//! use healer_common::resilience::{retry_with_backoff, RetryError};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn fetch_run_logs() -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn example() -> Result<(), RetryError<std::io::Error>> {
//! let token = CancellationToken::new();
//! let logs = retry_with_backoff(&token, fetch_run_logs, 3, Duration::from_millis(200)).await?;
//! # let _ = logs;
//! # Ok(())
//! # }
//! ```

mod call;
pub mod circuit_breaker;
mod clock;
mod error;
pub mod rate_limiter;
pub mod retry;
mod timeout;

pub use call::ResilientCall;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ResilienceError, ResilienceResult};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder};
pub use retry::{
    policies, retry_with_backoff, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryError, RetryExecutor, RetryPolicy, RetryResult,
};
pub use timeout::TimeoutScope;
