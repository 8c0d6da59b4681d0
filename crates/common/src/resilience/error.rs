//! Errors produced by the resilience primitives
//!
//! [`ResilienceError`] is generic over the protected operation's error type
//! `E`, so the original error always survives wrapping and stays reachable
//! through [`std::error::Error::source`].

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorKind, ErrorSeverity};

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Errors that can occur around a protected operation
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker rejected the call without invoking the operation
    #[error("circuit '{name}' is open, rejecting calls")]
    CircuitOpen { name: String, retry_after: Option<Duration> },

    /// Rate limiter had no tokens left in the current window
    #[error("rate limit for '{name}' exceeded: {capacity} calls per {window:?}")]
    RateLimited { name: String, capacity: u64, window: Duration, retry_after: Duration },

    /// Cancellation fired before or between attempts
    #[error("operation '{operation}' cancelled after {attempts} attempt(s)")]
    Cancelled { operation: String, attempts: u32 },

    /// The operation itself failed
    #[error("operation '{operation}' failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// A component was configured with invalid parameters
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Failure kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::OperationFailed { .. } => ErrorKind::Operation,
            Self::InvalidConfiguration { .. } => ErrorKind::Config,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The wrapped operation error, if this is an operation failure
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consume the error and return the wrapped operation error, if any
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: std::error::Error + ErrorClassification + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::RateLimited { .. } => true,
            Self::Cancelled { .. } | Self::InvalidConfiguration { .. } => false,
            Self::OperationFailed { source, .. } => source.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::RateLimited { .. } | Self::Cancelled { .. } => {
                ErrorSeverity::Warning
            }
            Self::InvalidConfiguration { .. } => ErrorSeverity::Error,
            Self::OperationFailed { source, .. } => source.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::OperationFailed { source, .. } => source.is_critical(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            Self::OperationFailed { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}
