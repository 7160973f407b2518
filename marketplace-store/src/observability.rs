//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Error, error::Result};

/// Install a JSON subscriber filtered at the configured log level
///
/// `RUST_LOG`-style directives are accepted in `service.log_level`; an
/// unparsable value falls back to `info`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize tracing: {e}")))?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Tracing initialized"
    );

    Ok(())
}

/// Flush point for shutdown
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}
