//! Log output for the CLI.
//!
//! Logs go to stderr so command output on stdout stays parseable. `RUST_LOG`
//! takes precedence over the configured level.

use capsule_registry::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in tests.
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
