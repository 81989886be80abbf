//! # Guild Service
//!
//! The node-side guild system for a clustered game server. One
//! [`GuildService`] runs per node and owns:
//!
//! - a blocking facade over the shared guild store
//! - the advisory player-to-guild cache for this node
//! - staged confirmations for destructive actions
//! - teleport warmups and the battle arena
//! - both directions of the cluster bus
//!
//! The host plugs in through the traits in [`hooks`]: wallet access,
//! player lookup and messaging, inventory snapshots, and the in-world
//! battle effects. Everything else is self-contained.

pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod pending;
pub mod service;
pub mod store_handle;
pub mod timer;

pub use cache::{NodeCache, PendingInvite};
pub use config::{
    BattleConfig, BuffSettings, ConfigError, CostConfig, GuildConfig, LimitConfig, TimingConfig,
};
pub use error::{GuildError, GuildResult};
pub use hooks::{BattleHost, BusPublisher, Collaborators, Economy, InventoryVault, NullBus, PlayerDirectory};
pub use pending::PendingKind;
pub use service::{BankAdminOp, BattleStatus, GuildOverview, GuildService, InviteOutcome};

#[cfg(test)]
mod tests;
