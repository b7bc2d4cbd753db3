// Logging module - Diagnostics to stderr
use crate::domain::error::{PortLogError, PortLogResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, then `--verbose`, then the configured level
pub fn build_filter(log_level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if verbose { "debug" } else { log_level };
    EnvFilter::try_new(format!("portlog={},warn", level))
        .unwrap_or_else(|_| EnvFilter::new("portlog=info,warn"))
}

/// Initialize logging system
pub fn init_logging(log_level: &str, verbose: bool) -> PortLogResult<()> {
    tracing_subscriber::registry()
        .with(build_filter(log_level, verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| PortLogError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("PortLog logging system initialized");
    Ok(())
}
