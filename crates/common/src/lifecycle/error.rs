use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorKind, ErrorSeverity};

/// Result type for teardown operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// One release or shutdown action that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub name: String,
    pub message: String,
}

impl ReleaseFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into() }
    }
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Aggregate teardown failure, reported after every action was attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(
        "failed to release {} of {attempted} resource(s): {}",
        .failures.len(),
        join(.failures)
    )]
    Cleanup { attempted: usize, failures: Vec<ReleaseFailure> },

    #[error("{} of {attempted} shutdown action(s) failed: {}", .failures.len(), join(.failures))]
    Shutdown { attempted: usize, failures: Vec<ReleaseFailure> },
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Cleanup
    }

    pub fn failures(&self) -> &[ReleaseFailure] {
        match self {
            Self::Cleanup { failures, .. } | Self::Shutdown { failures, .. } => failures,
        }
    }

    pub fn attempted(&self) -> usize {
        match self {
            Self::Cleanup { attempted, .. } | Self::Shutdown { attempted, .. } => *attempted,
        }
    }
}

impl ErrorClassification for LifecycleError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

fn join(failures: &[ReleaseFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
