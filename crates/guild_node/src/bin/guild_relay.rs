//! Guild relay - standalone fan-out hub for the cluster bus
//!
//! Nodes connect here, announce themselves, and have their frames
//! forwarded to every other node on the same channel.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use guild_node::config::LoggingSettings;
use guild_node::relay::GuildRelay;
use guild_node::{logging, shutdown};

/// Command-line arguments for the guild relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct RelayArgs {
    /// Address to listen on for node connections
    #[arg(short, long, default_value = "127.0.0.1:7077")]
    listen: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable JSON-formatted log output
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = RelayArgs::parse();

    let logging_settings = LoggingSettings {
        level: if args.debug { "debug" } else { "info" }.to_string(),
        json_format: args.json_logs,
    };
    logging::setup_logging(&logging_settings)?;

    info!("📡 Starting guild relay");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let relay = GuildRelay::bind(&args.listen).await?;

    // Setup shutdown handler
    let shutdown_receiver = shutdown::setup_shutdown_handler().await;

    tokio::select! {
        result = relay.run() => {
            result?;
        }
        _ = shutdown_receiver => {
            info!("Shutdown signal received");
        }
    }

    info!("Guild relay stopped");
    Ok(())
}
