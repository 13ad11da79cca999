//! Logging initialization.
//!
//! Uses the `tracing` ecosystem with output on stderr, since stdout is
//! reserved for the run report. The effective level and format come from
//! the config file's `[logging]` section, overridable per invocation by
//! the CLI flags and by `RUST_LOG`.

use pngsift_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem from config plus CLI overrides.
pub fn init(config: &LoggingConfig, verbose: bool, json_logs: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_logs || config.format == "json" {
        // JSON format for machine parsing
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        // Pretty format for humans
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}
