//! Logging system setup and configuration
//!
//! This module handles the initialization of the tracing-based logging
//! system used throughout the node for diagnostic output.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the logging system
///
/// Sets up structured logging using the tracing crate with the level and
/// output format taken from the configuration file (after CLI overrides).
///
/// # Environment Variables
/// * `RUST_LOG` - Override the configured filter (e.g., "debug", "guild_service=trace")
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    // Respect RUST_LOG when set, fall back to the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingSettings;

    #[test]
    fn test_logging_setup() {
        let settings = LoggingSettings {
            level: "info".to_string(),
            json_format: false,
        };

        // The first call in the test process succeeds; later calls fail
        // because the global subscriber can only be installed once.
        let result = setup_logging(&settings);
        assert!(result.is_ok() || result.is_err());
    }
}
