//! Resilience and bounded-resource control layer for the Healer agent.
//!
//! Every outbound call the agent makes (LLM providers, the source-control
//! API) and every cached computation passes through the primitives in this
//! crate: input validation, a TTL result cache, a token-bucket rate limiter,
//! a circuit breaker, cancellable retry with backoff, chunked stream
//! ingestion, and deterministic teardown of acquired resources.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, validation, configuration
//! - `runtime` (default): cache, resilience, streams, lifecycle, logging
//! - `test-utils`: test doubles for downstream crates

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod config;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod validation;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod observability;
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod stream;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(all(feature = "runtime", any(feature = "test-utils", test)))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{fingerprint, Cache, CacheConfig, CacheStats};
#[cfg(feature = "foundation")]
pub use config::{HealerConfig, LimitSettings, LoggingConfig};
#[cfg(feature = "foundation")]
pub use error::{
    BoxedError, CommonError, CommonResult, ErrorClassification, ErrorKind, ErrorSeverity,
};
#[cfg(feature = "runtime")]
pub use lifecycle::{LifecycleError, Releasable, ReleaseFn, ResourceManager, ShutdownCoordinator};
#[cfg(feature = "runtime")]
pub use observability::init_tracing;
#[cfg(feature = "runtime")]
pub use resilience::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, MockClock,
    RateLimiter, RateLimiterConfig, ResilienceError, ResilienceResult, ResilientCall, RetryConfig,
    RetryError, RetryExecutor, SystemClock, TimeoutScope,
};
#[cfg(feature = "runtime")]
pub use stream::{
    process_in_chunks, process_in_chunks_async, process_with_limits, process_with_limits_async,
    StreamError,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
#[cfg(feature = "foundation")]
pub use validation::{
    validate, validate_provider_name, validate_repository_owner_and_name, validate_run_id,
    Provider, ValidationError, ValidationResult, MAX_LOG_SIZE,
};
