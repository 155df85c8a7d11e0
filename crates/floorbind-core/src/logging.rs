//! Structured logging setup driven by the configuration's log level.

use floorbind_types::LogLevel;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging.
///
/// The environment filter wins when `RUST_LOG` is set; otherwise the
/// configured level applies to the whole workspace. Safe to call more than
/// once; later calls are no-ops.
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_level_filter().to_string()));
    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if !initialized {
        debug!("logging already initialized");
    }
}
