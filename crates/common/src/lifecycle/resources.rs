//! Per-operation resource release

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use super::drain::Drain;
use super::error::{LifecycleError, LifecycleResult, ReleaseFailure};
use crate::error::BoxedError;

/// A handle with a single release operation
///
/// Implemented by anything an operation acquires and must give back: HTTP
/// client pools, temporary files, spawned timers. The manager only calls
/// `release`; it never inspects the handle.
#[async_trait]
pub trait Releasable: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    async fn release(&self) -> Result<(), BoxedError>;
}

/// [`Releasable`] built from a name and a one-shot async closure
pub struct ReleaseFn<F> {
    name: String,
    release: Mutex<Option<F>>,
}

impl<F> ReleaseFn<F> {
    pub fn new(name: impl Into<String>, release: F) -> Self {
        Self { name: name.into(), release: Mutex::new(Some(release)) }
    }
}

impl<F> fmt::Debug for ReleaseFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseFn").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Releasable for ReleaseFn<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxedError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) -> Result<(), BoxedError> {
        let release = self.release.lock().take();
        match release {
            Some(release) => release().await,
            None => Ok(()),
        }
    }
}

/// Releases registered handles in registration order
///
/// Typically one manager per top-level operation (one analysis run):
/// handles are added as they are acquired and [`ResourceManager::cleanup`]
/// is called once on every exit path. A failing release never prevents the
/// remaining releases; failures are collected into
/// [`LifecycleError::Cleanup`].
///
/// # Example
/// ```
/// use healer_common::lifecycle::{ReleaseFn, ResourceManager};
/// use healer_common::BoxedError;
///
/// # tokio_test::block_on(async {
/// let resources = ResourceManager::new();
/// resources.add(ReleaseFn::new("scratch-dir", || async { Ok::<_, BoxedError>(()) }));
/// resources.cleanup().await.unwrap();
/// assert!(resources.is_empty());
/// # });
/// ```
#[derive(Default)]
pub struct ResourceManager {
    resources: Mutex<Vec<Box<dyn Releasable>>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle for release by the next `cleanup`
    pub fn add<R>(&self, resource: R)
    where
        R: Releasable + 'static,
    {
        debug!(resource = resource.name(), "resource registered");
        self.resources.lock().push(Box::new(resource));
    }

    /// Register an already boxed handle
    pub fn add_boxed(&self, resource: Box<dyn Releasable>) {
        debug!(resource = resource.name(), "resource registered");
        self.resources.lock().push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// Release every registered handle, in registration order.
    ///
    /// The registry is drained first, so each handle is released at most
    /// once and a second call with nothing newly registered is a no-op.
    /// If the returned future is dropped partway, handles not yet reached
    /// are put back and the next `cleanup` releases them; the handle whose
    /// release was in flight is not retried.
    ///
    /// # Errors
    /// `LifecycleError::Cleanup` listing every failed release, returned only
    /// after all releases were attempted.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> LifecycleResult<()> {
        let mut resources = Drain::new(&self.resources);
        let attempted = resources.attempted();
        let mut failures = Vec::new();

        while let Some(resource) = resources.next_item() {
            match resource.release().await {
                Ok(()) => debug!(resource = resource.name(), "resource released"),
                Err(error) => {
                    warn!(resource = resource.name(), %error, "failed to release resource");
                    failures.push(ReleaseFailure::new(resource.name(), error.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Cleanup { attempted, failures })
        }
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resources = self.resources.lock();
        let names: Vec<&str> = resources.iter().map(|r| r.name()).collect();
        f.debug_struct("ResourceManager").field("resources", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the resource manager

    use std::sync::Arc;

    use super::*;

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> impl Releasable {
        let log = Arc::clone(log);
        ReleaseFn::new(name, move || async move {
            log.lock().push(name);
            if fail {
                Err(BoxedError::from(format!("{name} refused to close")))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_cleanup_releases_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ResourceManager::new();
        manager.add(recorder("first", &log, false));
        manager.add(recorder("second", &log, false));
        manager.add(recorder("third", &log, false));
        assert_eq!(manager.len(), 3);

        manager.cleanup().await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
        assert!(manager.is_empty());
    }

    /// Validates that one failing release does not stop the others.
    ///
    /// Assertions:
    /// - Every handle is released exactly once.
    /// - The error names each failed handle and the attempted count.
    #[tokio::test]
    async fn test_cleanup_continues_past_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ResourceManager::new();
        manager.add(recorder("pool", &log, true));
        manager.add(recorder("tempfile", &log, false));
        manager.add(recorder("timer", &log, true));

        let err = manager.cleanup().await.unwrap_err();

        assert_eq!(*log.lock(), vec!["pool", "tempfile", "timer"]);
        assert_eq!(err.attempted(), 3);
        let names: Vec<&str> = err.failures().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["pool", "timer"]);
        assert!(err.to_string().contains("pool refused to close"));
    }

    #[tokio::test]
    async fn test_second_cleanup_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ResourceManager::new();
        manager.add(recorder("pool", &log, true));

        assert!(manager.cleanup().await.is_err());
        manager.cleanup().await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    /// Validates that an interrupted cleanup loses no unreached handles.
    ///
    /// Assertions:
    /// - Handles after the hung release stay registered.
    /// - The next cleanup releases them in order.
    #[tokio::test(start_paused = true)]
    async fn test_interrupted_cleanup_keeps_unreached_handles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ResourceManager::new();
        manager.add(recorder("clone-dir", &log, false));
        manager.add(ReleaseFn::new("hung-socket", || async {
            futures::future::pending::<()>().await;
            Ok::<_, BoxedError>(())
        }));
        manager.add(recorder("log-file", &log, false));
        manager.add(recorder("llm-session", &log, false));

        let interrupted =
            tokio::time::timeout(std::time::Duration::from_secs(1), manager.cleanup()).await;
        assert!(interrupted.is_err());
        assert_eq!(manager.len(), 2);

        manager.cleanup().await.unwrap();
        assert_eq!(*log.lock(), vec!["clone-dir", "log-file", "llm-session"]);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_release_fn_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = recorder("once", &log, false);
        handle.release().await.unwrap();
        handle.release().await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_debug_lists_names() {
        let manager = ResourceManager::new();
        manager.add_boxed(Box::new(ReleaseFn::new("llm-client", || async {
            Ok::<_, BoxedError>(())
        })));
        assert!(format!("{manager:?}").contains("llm-client"));
    }
}
