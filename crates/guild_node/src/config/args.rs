//! Command-line argument parsing
//!
//! This module defines the command-line interface for the guild node
//! using the clap crate for argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the guild node
///
/// These arguments allow users to override configuration file settings
/// and control node behavior from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// Specifies the path to the TOML configuration file.
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Node identifier
    ///
    /// Override the node id from the configuration file. Must be unique
    /// within the cluster.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Relay address
    ///
    /// Override the cluster relay address from the configuration file.
    /// Format: "IP:PORT" (e.g., "10.0.0.5:7077"). Implies cluster mode.
    #[arg(long)]
    pub relay: Option<String>,

    /// Run without the cluster bus
    ///
    /// Forces standalone mode even when the configuration file enables
    /// the cluster. Useful for local development against a scratch store.
    #[arg(long)]
    pub standalone: bool,

    /// Enable debug logging
    ///
    /// When enabled, sets the logging level to debug, providing more
    /// detailed output for troubleshooting.
    #[arg(short, long)]
    pub debug: bool,

    /// Enable JSON-formatted log output
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.toml"),
            node_id: None,
            relay: None,
            standalone: false,
            debug: false,
            json_logs: false,
        }
    }
}
