//! # Guild Node
//!
//! The runnable shell around the guild system: configuration and CLI
//! handling, logging, graceful shutdown, the cluster bus endpoint, the
//! relay tier, and the bootstrap that assembles a guild service from
//! its parts.
//!
//! Two binaries build from this crate:
//!
//! * `guild_node` runs a node. Standalone it only needs a database
//!   path; with `[cluster]` enabled it also connects to a relay. The
//!   binary uses log-only collaborators ([`headless`]); an embedding
//!   game server would instead call [`GuildNode::bootstrap`] with real
//!   wallet, session, inventory and world implementations.
//! * `guild_relay` runs the fan-out hub the nodes connect to.

pub mod bus;
pub mod config;
pub mod headless;
pub mod logging;
pub mod node;
pub mod relay;
pub mod shutdown;

pub use bus::BusEndpoint;
pub use config::{Args, Config};
pub use node::{GuildNode, HostServices};
pub use relay::GuildRelay;
