//! Deadline-bounded cancellation scopes
//!
//! A [`TimeoutScope`] derives a child of a parent [`CancellationToken`] that
//! is cancelled at whichever comes first: the parent's cancellation or
//! `now + timeout`. The scope owns the timer task; dropping the scope
//! cancels the child token and stops the timer, so every exit path releases
//! it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CommonError, CommonResult};

/// Child cancellation scope with an additional deadline
#[derive(Debug)]
pub struct TimeoutScope {
    token: CancellationToken,
    timeout: Duration,
    deadline: Option<Instant>,
    timed_out: Arc<AtomicBool>,
    timer: JoinHandle<()>,
}

impl TimeoutScope {
    /// Derive a scope from `parent` that also fires after `timeout`.
    ///
    /// # Errors
    /// Returns `CommonError::Internal` when called outside a Tokio runtime.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> CommonResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| CommonError::internal_with_context(e.to_string(), "timeout_scope"))?;

        let token = parent.child_token();
        let deadline = Instant::now().checked_add(timeout);
        let timed_out = Arc::new(AtomicBool::new(false));

        let timer_token = token.clone();
        let timer_flag = Arc::clone(&timed_out);
        let timer = handle.spawn(async move {
            tokio::select! {
                () = timer_token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    timer_flag.store(true, Ordering::Release);
                    timer_token.cancel();
                    debug!(?timeout, "timeout scope deadline reached");
                }
            }
        });

        Ok(Self { token, timeout, deadline, timed_out, timer })
    }

    /// The scope's token; clone it to hand to operations
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute deadline, `None` if `now + timeout` is not representable
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline fires
    pub fn remaining(&self) -> Duration {
        self.deadline
            .map_or(Duration::MAX, |deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the scope was cancelled by its own deadline (as opposed to
    /// the parent or an explicit cancel)
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `future` until it completes or the scope is cancelled.
    ///
    /// # Errors
    /// `CommonError::Timeout` when the deadline fired first,
    /// `CommonError::TaskCancelled` when the parent or an explicit cancel did.
    pub async fn run<F>(&self, operation: &str, future: F) -> CommonResult<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => {
                if self.timed_out() {
                    Err(CommonError::timeout(operation, self.timeout))
                } else {
                    Err(CommonError::task_cancelled(operation))
                }
            }
            output = future => Ok(output),
        }
    }

    /// Cancel the scope now and release its timer
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimeoutScope {
    fn drop(&mut self) {
        self.token.cancel();
        self.timer.abort();
    }
}
