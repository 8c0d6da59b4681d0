//! Test doubles for operations and releasable handles

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::{BoxedError, ErrorClassification, ErrorSeverity};
use crate::lifecycle::Releasable;

/// Error returned by [`ScriptedOperation`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TestError {
    pub message: String,
    pub retryable: bool,
}

impl TestError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

impl ErrorClassification for TestError {
    fn is_retryable(&self) -> bool {
        self.retryable
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

/// Operation that fails a fixed number of times, then succeeds
///
/// Clones share the call counter. On success the operation returns the
/// 1-based number of the call that succeeded.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use healer_common::testing::ScriptedOperation;
///
/// let op = ScriptedOperation::failing(2);
/// assert!(op.invoke_sync().is_err());
/// assert!(op.invoke_sync().is_err());
/// assert_eq!(op.invoke_sync(), Ok(3));
/// assert_eq!(op.calls(), 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    failures: u32,
    error: TestError,
    calls: Arc<AtomicU32>,
}

impl ScriptedOperation {
    /// Fails the first `failures` calls with a transient error
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            error: TestError::transient("upstream unavailable"),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn succeeding() -> Self {
        Self::failing(0)
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Replace the error returned by failing calls
    pub fn with_error(mut self, error: TestError) -> Self {
        self.error = error;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn invoke_sync(&self) -> Result<u32, TestError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(call)
        }
    }

    pub fn invoke(&self) -> impl Future<Output = Result<u32, TestError>> + Send + 'static {
        let result = self.invoke_sync();
        async move { result }
    }
}

/// Shared, ordered record of releases
#[derive(Debug, Clone, Default)]
pub struct ReleaseLog(Arc<Mutex<Vec<String>>>);

impl ReleaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// A handle that records its name here when released
    pub fn releasable(&self, name: impl Into<String>) -> RecordingReleasable {
        RecordingReleasable { name: name.into(), log: self.clone(), fail: false }
    }

    /// Like [`ReleaseLog::releasable`], but the release reports an error
    /// after recording
    pub fn failing_releasable(&self, name: impl Into<String>) -> RecordingReleasable {
        RecordingReleasable { name: name.into(), log: self.clone(), fail: true }
    }

    fn record(&self, name: &str) {
        self.0.lock().push(name.to_string());
    }
}

/// [`Releasable`] that records each release in a [`ReleaseLog`]
#[derive(Debug, Clone)]
pub struct RecordingReleasable {
    name: String,
    log: ReleaseLog,
    fail: bool,
}

#[async_trait]
impl Releasable for RecordingReleasable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) -> Result<(), BoxedError> {
        self.log.record(&self.name);
        if self.fail {
            Err(format!("{} failed to close", self.name).into())
        } else {
            Ok(())
        }
    }
}
