//! Guild node - main entry point
//!
//! Loads configuration, initializes logging, bootstraps the guild
//! service with log-only collaborators and runs until a termination
//! signal arrives.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use guild_node::config::{self, Args, Config};
use guild_node::node::GuildNode;
use guild_node::{headless, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration and apply CLI overrides before logging starts,
    // so the configured level and format take effect from the first line
    let mut config = config::load_config(&args).await?;
    config::apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    logging::setup_logging(&config.logging)?;

    info!("🏰 Starting guild node");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());
    log_node_configuration(&config);

    let mut node = GuildNode::bootstrap(config, headless::host_services()).await?;

    // Setup shutdown handler
    let shutdown_receiver = shutdown::setup_shutdown_handler().await;
    info!("✅ Guild node is running - press Ctrl+C to stop");

    let _ = shutdown_receiver.await;
    info!("Shutdown signal received");
    node.shutdown();

    Ok(())
}

/// Log the effective node configuration
fn log_node_configuration(config: &Config) {
    info!("Node configuration:");
    info!("  Node id: {}", config.node.id);
    info!("  Store: {}", config.storage.path);
    if config.cluster.enabled {
        info!("  Relay: {}", config.cluster.relay_addr);
        info!("  Channel: {}", config.cluster.channel);
    } else {
        info!("  Cluster: disabled");
    }
}
