//! Logging setup
//!
//! Library code only emits `tracing` events. Binaries embedding the healer
//! call [`init_tracing`] once at startup to install a `fmt` subscriber
//! filtered by `RUST_LOG`, falling back to [`LoggingConfig::level`].

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{CommonError, CommonResult};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Install the global subscriber described by `config`.
///
/// Calling it again after a successful install is a no-op.
///
/// # Errors
/// - `CommonError::Config` for an unparsable `logging.level`
/// - `CommonError::Internal` when another global subscriber is already set
pub fn init_tracing(config: &LoggingConfig) -> CommonResult<()> {
    INSTALLED.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &LoggingConfig) -> CommonResult<()> {
    let filter = env_filter(&config.level, std::env::var(EnvFilter::DEFAULT_ENV).ok())?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.map_err(|e| CommonError::internal_with_context(e.to_string(), "init_tracing"))?;

    tracing::debug!(level = %config.level, json = config.json, "tracing initialised");
    Ok(())
}

/// Build the filter: a non-empty `env_directives` wins over `level`
pub(crate) fn env_filter(level: &str, env_directives: Option<String>) -> CommonResult<EnvFilter> {
    if let Some(directives) = env_directives.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(level).map_err(|e| CommonError::config_field("logging.level", e.to_string()))
}
