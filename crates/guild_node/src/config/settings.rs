//! Configuration settings structures
//!
//! This module defines the node configuration loaded from the TOML file:
//! node identity, storage location, cluster bus settings, logging and the
//! embedded guild rules table.

use guild_service::GuildConfig;
use serde::{Deserialize, Serialize};

/// Main configuration structure
///
/// This is the root configuration object for one node process. It can be
/// serialized to/from TOML format for configuration files; every section
/// has defaults so a partial file still loads, but unknown keys are
/// rejected so a typo fails the boot instead of silently applying defaults.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Node identity settings
    #[serde(default)]
    pub node: NodeSettings,
    /// Persistent store settings
    #[serde(default)]
    pub storage: StorageSettings,
    /// Cluster bus settings
    #[serde(default)]
    pub cluster: ClusterSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Guild rules: fees, limits, timing windows, battle pacing, buffs
    #[serde(default)]
    pub guilds: GuildConfig,
}

/// Node identity settings
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct NodeSettings {
    /// Unique name of this node within the cluster
    ///
    /// Teleport anchors record the node that owns them, and the relay
    /// uses this name in its logs. Two nodes must never share an id.
    pub id: String,
}

/// Persistent store settings
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Path of the SQLite database file
    ///
    /// Every node of a cluster points at the same shared file (or a
    /// network-mounted copy of it); the store is the source of truth.
    pub path: String,
}

/// Cluster bus settings
///
/// Controls whether and how this node talks to the rest of the cluster.
/// With the bus disabled the node runs standalone and cross-node
/// messages go nowhere.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClusterSettings {
    /// Whether to connect to a relay at all
    pub enabled: bool,

    /// Address of the relay process
    ///
    /// Format: "IP:PORT" (e.g., "127.0.0.1:7077")
    pub relay_addr: String,

    /// Logical channel announced in the relay handshake
    ///
    /// The relay only forwards frames between nodes on the same channel,
    /// so separate deployments can share one relay.
    pub channel: String,

    /// Delay between reconnection attempts, in milliseconds
    pub reconnect_ms: u64,
}

/// Logging system configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Logging level filter
    ///
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    ///
    /// When true, logs are output in structured JSON format,
    /// useful for log aggregation systems.
    pub json_format: bool,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            id: "node-1".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "guilds.db".to_string(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_addr: "127.0.0.1:7077".to_string(),
            channel: "guilds".to_string(),
            reconnect_ms: 3000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for Config {
    /// Create a default configuration suitable for a standalone
    /// development node: local database file, bus disabled.
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            storage: StorageSettings::default(),
            cluster: ClusterSettings::default(),
            logging: LoggingSettings::default(),
            guilds: GuildConfig::default(),
        }
    }
}

impl Config {
    /// Checks the constraints serde cannot express. Called once at boot,
    /// after CLI overrides have been applied.
    pub fn validate(&self) -> Result<(), String> {
        if self.node.id.trim().is_empty() {
            return Err("node.id must not be empty".to_string());
        }
        if self.storage.path.trim().is_empty() {
            return Err("storage.path must not be empty".to_string());
        }

        if self.cluster.enabled {
            if self
                .cluster
                .relay_addr
                .parse::<std::net::SocketAddr>()
                .is_err()
            {
                return Err(format!(
                    "cluster.relay_addr is not a valid socket address: {}",
                    self.cluster.relay_addr
                ));
            }
            if self.cluster.channel.trim().is_empty() {
                return Err("cluster.channel must not be empty".to_string());
            }
            if self.cluster.reconnect_ms == 0 {
                return Err("cluster.reconnect_ms must be at least 1".to_string());
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "logging.level must be one of {:?}, got: {}",
                valid_levels, self.logging.level
            ));
        }

        self.guilds.validate().map_err(|e| e.to_string())
    }
}
