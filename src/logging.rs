//! Log output setup for the binary.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, then `logging.level`, then `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, writing to stderr so stdout stays clean
/// for `--json` output. Calling it again is a no-op.
pub fn init(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
