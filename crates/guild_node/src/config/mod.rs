//! Configuration module for the guild node
//!
//! This module handles command-line arguments, configuration file parsing,
//! and provides default settings for the node.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{ClusterSettings, Config, LoggingSettings, NodeSettings, StorageSettings};

use anyhow::Result;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// This function attempts to load configuration from the specified file.
/// If the file doesn't exist, it creates a default configuration file
/// and returns the default settings.
///
/// # Arguments
/// * `args` - Command line arguments containing the config file path
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(args: &Args) -> Result<Config> {
    if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );

        // Create default config file
        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        Ok(default_config)
    }
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(node_id) = &args.node_id {
        config.node.id = node_id.clone();
    }

    if let Some(relay) = &args.relay {
        config.cluster.relay_addr = relay.clone();
        config.cluster.enabled = true;
    }

    if args.standalone {
        config.cluster.enabled = false;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }
}
