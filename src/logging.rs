//! Logging configuration and initialization

use crate::config::LoggingConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `false` when a
/// global subscriber was already installed, so repeated calls are harmless.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose >= 1) // Show target module for verbose >= 1
        .with_thread_ids(config.verbose >= 2)
        .with_line_number(config.verbose >= 2)
        .try_init()
        .is_ok();

    if installed {
        debug!(
            "Logging initialized at level {} (verbosity {})",
            config.level, config.verbose
        );
    }
    installed
}
