//! Deterministic teardown of acquired resources
//!
//! - **[`ResourceManager`]**: per-operation registry of [`Releasable`]
//!   handles, released in registration order by one `cleanup` call
//! - **[`ShutdownCoordinator`]**: process-lifetime teardown actions, run
//!   once in registration order by `shutdown`
//!
//! Both attempt every release even when some fail and report the failures
//! together as a [`LifecycleError`].

mod drain;
mod error;
mod resources;
mod shutdown;

pub use error::{LifecycleError, LifecycleResult, ReleaseFailure};
pub use resources::{Releasable, ReleaseFn, ResourceManager};
pub use shutdown::{ShutdownCoordinator, ShutdownFuture};
