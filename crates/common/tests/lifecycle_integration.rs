//! Integration tests for resource teardown and shutdown coordination
//!
//! Registers releasable resources and shutdown actions the way the agent
//! does at startup, then checks ordering and failure aggregation.

#![cfg(feature = "test-utils")]

use std::time::Duration;

use healer_common::error::{BoxedError, ErrorKind};
use healer_common::lifecycle::{
    LifecycleError, Releasable, ReleaseFn, ResourceManager, ShutdownCoordinator,
};
use healer_common::testing::ReleaseLog;

/// Validates release ordering and failure aggregation.
///
/// Assertions:
/// - All three resources are released in registration order.
/// - The middle failure does not stop the third release.
/// - The aggregate error names the failing resource.
#[tokio::test]
async fn test_cleanup_releases_in_order_and_reports_failures() {
    let log = ReleaseLog::new();
    let manager = ResourceManager::new();
    manager.add(log.releasable("clone-dir"));
    manager.add(log.failing_releasable("log-file"));
    manager.add(log.releasable("llm-session"));

    let err = manager.cleanup().await.unwrap_err();

    assert_eq!(log.entries(), vec!["clone-dir", "log-file", "llm-session"]);
    assert_eq!(err.kind(), ErrorKind::Cleanup);
    assert_eq!(err.attempted(), 3);
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].name, "log-file");
    assert!(err.to_string().contains("log-file failed to close"));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn test_cleanup_of_real_temp_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkout");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("build.log"), "error: linker failed").unwrap();

    let manager = ResourceManager::new();
    let target = path.clone();
    manager.add(ReleaseFn::new("checkout", move || async move {
        tokio::fs::remove_dir_all(&target).await.map_err(BoxedError::from)
    }));

    manager.cleanup().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_cleanup_with_nothing_registered() {
    let manager = ResourceManager::default();
    assert!(manager.cleanup().await.is_ok());
}

#[tokio::test]
async fn test_resources_added_after_cleanup_are_released_next_time() {
    let log = ReleaseLog::new();
    let manager = ResourceManager::new();
    manager.add(log.releasable("first"));
    manager.cleanup().await.unwrap();

    manager.add(log.releasable("second"));
    assert_eq!(manager.len(), 1);
    manager.cleanup().await.unwrap();

    assert_eq!(log.entries(), vec!["first", "second"]);
}

/// Validates coordinated shutdown.
///
/// Assertions:
/// - Worker tokens are cancelled before any action runs.
/// - Actions run in registration order, past failures.
/// - The aggregate error counts the failed action.
#[tokio::test]
async fn test_shutdown_cancels_workers_then_runs_actions() {
    let coordinator = ShutdownCoordinator::new();
    let log = ReleaseLog::new();

    let worker_token = coordinator.token();
    let worker = tokio::spawn(async move { worker_token.cancelled().await });

    let flush = log.releasable("flush-cache");
    let token = coordinator.token();
    coordinator.add_shutdown_func("flush-cache", move || async move {
        assert!(token.is_cancelled());
        flush.release().await
    });
    let provider = log.failing_releasable("close-provider");
    coordinator
        .add_shutdown_func("close-provider", move || async move { provider.release().await });
    let report = log.releasable("write-report");
    coordinator.add_shutdown_func("write-report", move || async move { report.release().await });

    let err = coordinator.shutdown().await.unwrap_err();
    worker.await.unwrap();

    assert!(coordinator.is_shutting_down());
    assert!(matches!(err, LifecycleError::Shutdown { attempted: 3, .. }));
    assert_eq!(err.failures()[0].name, "close-provider");
    assert_eq!(log.entries(), vec!["flush-cache", "close-provider", "write-report"]);
}

#[tokio::test(start_paused = true)]
async fn test_hung_shutdown_action_is_bounded() {
    let coordinator = ShutdownCoordinator::new().with_action_timeout(Duration::from_secs(5));
    let log = ReleaseLog::new();

    coordinator.add_shutdown_func("drain-queue", || async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<_, BoxedError>(())
    });
    let db = log.releasable("close-db");
    coordinator.add_shutdown_func("close-db", move || async move { db.release().await });

    let err = coordinator.shutdown().await.unwrap_err();

    assert_eq!(err.failures().len(), 1);
    assert!(err.failures()[0].message.contains("timed out"));
    assert_eq!(log.entries(), vec!["close-db"]);
    assert!(coordinator.shutdown().await.is_ok());
}
