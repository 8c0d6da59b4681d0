//! Process-lifetime teardown

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::drain::Drain;
use super::error::{LifecycleError, LifecycleResult, ReleaseFailure};
use crate::error::BoxedError;

/// Future returned by a registered shutdown action
pub type ShutdownFuture = BoxFuture<'static, Result<(), BoxedError>>;

struct ShutdownAction {
    name: String,
    run: Box<dyn FnOnce() -> ShutdownFuture + Send>,
}

/// Runs registered teardown actions once, in registration order
///
/// Holds the actions for handles that live as long as the process (client
/// pools, background workers). [`ShutdownCoordinator::shutdown`] first
/// cancels [`ShutdownCoordinator::token`], so background tasks observing it
/// start winding down, then runs every action. An action that fails (or
/// exceeds the optional per-action timeout) is recorded and the remaining
/// actions still run.
///
/// # Example
/// ```
/// use healer_common::lifecycle::ShutdownCoordinator;
///
/// # tokio_test::block_on(async {
/// let coordinator = ShutdownCoordinator::new();
/// let worker_token = coordinator.token();
/// coordinator.add_shutdown_func("flush-metrics", || async { Ok::<_, std::io::Error>(()) });
///
/// coordinator.shutdown().await.unwrap();
/// assert!(worker_token.is_cancelled());
/// # });
/// ```
pub struct ShutdownCoordinator {
    actions: Mutex<Vec<ShutdownAction>>,
    token: CancellationToken,
    action_timeout: Option<Duration>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
            action_timeout: None,
        }
    }

    /// Bound each action's run time; an action still running after
    /// `timeout` is abandoned and reported as failed
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Child token cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a fallible async action to run on shutdown
    pub fn add_shutdown_func<F, Fut, E>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxedError>,
    {
        let name = name.into();
        debug!(action = %name, "shutdown action registered");
        let run: Box<dyn FnOnce() -> ShutdownFuture + Send> =
            Box::new(move || action().map(|result| result.map_err(Into::into)).boxed());
        self.actions.lock().push(ShutdownAction { name, run });
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Cancel [`ShutdownCoordinator::token`] and run every registered action
    /// exactly once, in registration order.
    ///
    /// Actions are drained before they run, so calling `shutdown` again only
    /// runs actions registered since. If the returned future is dropped
    /// partway, actions not yet started are put back for the next call.
    ///
    /// # Errors
    /// `LifecycleError::Shutdown` listing every failed action, returned after
    /// all actions were attempted.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> LifecycleResult<()> {
        self.token.cancel();
        let mut actions = Drain::new(&self.actions);
        let attempted = actions.attempted();
        info!(actions = attempted, "shutting down");

        let mut failures = Vec::new();
        while let Some(ShutdownAction { name, run }) = actions.next_item() {
            let outcome = match self.action_timeout {
                Some(limit) => match tokio::time::timeout(limit, run()).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("timed out after {limit:?}").into()),
                },
                None => run().await,
            };

            match outcome {
                Ok(()) => debug!(action = %name, "shutdown action completed"),
                Err(error) => {
                    warn!(action = %name, %error, "shutdown action failed");
                    failures.push(ReleaseFailure::new(name, error.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Shutdown { attempted, failures })
        }
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions = self.actions.lock();
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        f.debug_struct("ShutdownCoordinator")
            .field("actions", &names)
            .field("shutting_down", &self.is_shutting_down())
            .field("action_timeout", &self.action_timeout)
            .finish()
    }
}
