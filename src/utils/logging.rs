//! Structured logging initialization.
//!
//! Installs a `tracing-subscriber` from a [`LoggingConfig`]. Library code
//! only emits `tracing` events; whether and how they are rendered is the
//! embedding application's choice, made once at startup.

use tracing::info;

use crate::config::LoggingConfig;
use crate::error::{Result, TransportError};

/// Install the global subscriber described by `config`.
///
/// # Errors
/// Returns `TransportError::Config` if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| TransportError::Config(format!("failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, "logging initialized");
    Ok(())
}
