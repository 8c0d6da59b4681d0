//! Validation gate for untrusted input at the ingestion boundary
//!
//! Every string that arrives from outside the agent (workflow logs, run ids,
//! repository coordinates, provider names from configuration) passes through
//! one of these fail-fast validators before it reaches a prompt, a log
//! buffer, or an outbound request.
//!
//! [`validate`] is deliberately minimal: it escapes literal newlines so a
//! log line cannot forge additional log records, and leaves every other
//! character untouched. It is not an injection filter; callers that need
//! stricter sanitization layer their own checks on top.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorKind, ErrorSeverity};

mod validators;

pub use validators::{
    validate, validate_provider_name, validate_repository_owner_and_name, validate_run_id,
    validate_with_limit,
};

/// Maximum accepted size, in bytes, of a single log or text input (10 MiB)
pub const MAX_LOG_SIZE: usize = 10 * 1024 * 1024;

/// Type alias for validation results
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation failures. None of these are ever retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input was empty (or whitespace only)
    #[error("input is empty")]
    EmptyInput,

    /// Input exceeded the size limit
    #[error("input too large: {size} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { size: usize, limit: usize },

    /// An identifier was malformed
    #[error("invalid {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    /// Provider is not in the supported set
    #[error("unknown provider '{name}' (supported: {})", Provider::supported_names())]
    UnknownProvider { name: String },
}

impl ValidationError {
    /// Failure kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::InputTooLarge { .. } => ErrorKind::InputTooLarge,
            Self::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Self::UnknownProvider { .. } => ErrorKind::UnknownProvider,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier { field, reason: reason.into() }
    }
}

impl ErrorClassification for ValidationError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// LLM providers the agent knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    /// All supported providers, in display order
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini];

    /// Canonical identifier used in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    fn supported_names() -> String {
        Self::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownProvider { name: s.to_string() })
    }
}
