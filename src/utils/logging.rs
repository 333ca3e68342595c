//! Structured logging setup
//!
//! The library only emits `tracing` events. Without an installed subscriber
//! they are dropped, so logging is never required for correct operation.
//! Applications that want output call [`init_logging`] once at startup.

use tracing::info;
use tracing_subscriber::fmt;

use crate::config::LoggingConfig;
use crate::error::{LinkError, Result};

/// Install a global `fmt` subscriber built from `config`
///
/// Fails with [`LinkError::ConfigError`] if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let builder = fmt()
        .with_max_level(config.log_level)
        .with_target(true);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| LinkError::ConfigError(format!("Failed to install logger: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
