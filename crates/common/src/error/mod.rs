//! Common error types and classification for the Healer resilience layer
//!
//! The layer distinguishes a small taxonomy of failure *kinds* (see
//! [`ErrorKind`]). Each concrete error type in the crate reports its kind and
//! implements [`ErrorClassification`], so callers can decide uniformly
//! whether to retry, back off, or surface a failure.
//!
//! | Kind | Produced by | Retried automatically |
//! |------|-------------|-----------------------|
//! | `EmptyInput`, `InputTooLarge`, `InvalidIdentifier`, `UnknownProvider` | validation gate | never |
//! | `CircuitOpen` | circuit breaker | no, try later |
//! | `RateLimited` | rate limiter | no, try later |
//! | `Cancelled` | retry executor, timeout scope | never |
//! | `Operation` | the wrapped operation itself | within the retry budget |
//! | `Cleanup` | resource manager, shutdown coordinator | never |
//!
//! Module-specific errors compose with [`CommonError`] rather than
//! duplicating its variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum AnalysisError {
//!     #[error("model returned no diagnosis")]
//!     EmptyDiagnosis,
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// Boxed error type used for type-erased operation and release failures
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Failure kinds recognised across the resilience layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input was empty after trimming
    EmptyInput,
    /// Input exceeded the maximum accepted size
    InputTooLarge,
    /// An identifier (run id, owner, repository) was malformed
    InvalidIdentifier,
    /// Provider name is not one of the supported providers
    UnknownProvider,
    /// Circuit breaker rejected the call without invoking the operation
    CircuitOpen,
    /// Rate limiter had no tokens left in the current window
    RateLimited,
    /// A cancellation signal fired before or during a wait
    Cancelled,
    /// A deadline elapsed
    Timeout,
    /// The wrapped operation failed on its own
    Operation,
    /// Configuration was invalid or could not be loaded
    Config,
    /// One or more resources failed to release during teardown
    Cleanup,
    /// Invariant violation or unexpected runtime condition
    Internal,
}

impl ErrorKind {
    /// Whether this kind is produced by the validation gate
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::InputTooLarge | Self::InvalidIdentifier | Self::UnknownProvider
        )
    }

    /// Stable snake_case identifier for logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::InputTooLarge => "input_too_large",
            Self::InvalidIdentifier => "invalid_identifier",
            Self::UnknownProvider => "unknown_provider",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Operation => "operation",
            Self::Config => "config",
            Self::Cleanup => "cleanup",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common error variants shared by the configuration and runtime helpers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization errors
    Serialization { message: String, format: Option<String> },

    /// File I/O errors
    Persistence { message: String, operation: Option<String> },

    /// Timeout errors
    Timeout { operation: String, duration: Duration },

    /// Task cancellation (async)
    TaskCancelled { task_id: String, reason: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String, context: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{}': {}", field, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::Serialization { message, format } => {
                if let Some(format) = format {
                    write!(f, "Serialization error ({}): {}", format, message)
                } else {
                    write!(f, "Serialization error: {}", message)
                }
            }
            Self::Persistence { message, operation } => {
                if let Some(op) = operation {
                    write!(f, "Persistence error during '{}': {}", op, message)
                } else {
                    write!(f, "Persistence error: {}", message)
                }
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::TaskCancelled { task_id, reason } => {
                if let Some(reason) = reason {
                    write!(f, "Task '{}' cancelled: {}", task_id, reason)
                } else {
                    write!(f, "Task '{}' cancelled", task_id)
                }
            }
            Self::Internal { message, context } => {
                if let Some(context) = context {
                    write!(f, "Internal error ({}): {}", context, message)
                } else {
                    write!(f, "Internal error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl CommonError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a serialization error tagged with its format (e.g. `"TOML"`)
    pub fn serialization_format<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create a persistence error for an operation
    pub fn persistence_op<O: Into<String>, S: Into<String>>(operation: O, message: S) -> Self {
        Self::Persistence { message: message.into(), operation: Some(operation.into()) }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a task cancellation error
    pub fn task_cancelled<S: Into<String>>(task_id: S) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: None }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), context: None }
    }

    /// Create an internal error with context
    pub fn internal_with_context<S: Into<String>, C: Into<String>>(message: S, context: C) -> Self {
        Self::Internal { message: message.into(), context: Some(context.into()) }
    }

    /// Failure kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Serialization { .. } | Self::Persistence { .. } => {
                ErrorKind::Config
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TaskCancelled { .. } => ErrorKind::Cancelled,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: the same request may succeed later.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention
    Error,
    /// Critical, requires immediate attention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } | Self::TaskCancelled { .. } => ErrorSeverity::Warning,
            Self::Config { .. } | Self::Serialization { .. } | Self::Persistence { .. } => {
                ErrorSeverity::Error
            }
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
