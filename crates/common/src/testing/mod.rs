//! Testing utilities and helpers
//!
//! - **[`fixtures`]**: synthetic CI logs and identifiers (deterministic
//!   seeded variants)
//! - **[`mocks`]**: scripted operations and recording releasable handles
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use std::time::Duration;
//!
//! use healer_common::resilience::retry_with_backoff;
//! use healer_common::testing::ScriptedOperation;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::failing(2);
//! let token = CancellationToken::new();
//! let attempt = retry_with_backoff(&token, || op.invoke(), 3, Duration::from_millis(1))
//!     .await
//!     .unwrap();
//! assert_eq!(attempt, 3);
//! # });
//! # }
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::{build_log_seeded, log_of_size, random_repository_name_seeded};
pub use mocks::{RecordingReleasable, ReleaseLog, ScriptedOperation, TestError};
pub use crate::resilience::{Clock, MockClock, SystemClock};
