//! Log-only collaborators for running a node without a game host.
//!
//! The standalone binary has no wallets, sessions or world to talk to,
//! so these implementations approve every economy call, know no
//! players, and log the side effects that would otherwise reach one.
//! That is enough to exercise the store and the cluster bus from the
//! command line; an embedding game server supplies real implementations
//! instead.

use std::sync::Arc;

use async_trait::async_trait;
use guild_service::{BattleHost, Economy, InventoryVault, PlayerDirectory};
use guild_types::{Money, NodeLocation, PlayerId};
use tracing::debug;

use crate::node::HostServices;

/// Builds the full log-only collaborator set.
pub fn host_services() -> HostServices {
    HostServices {
        economy: Arc::new(HeadlessEconomy),
        directory: Arc::new(HeadlessDirectory),
        vault: Arc::new(HeadlessVault),
        host: Arc::new(HeadlessHost),
    }
}

/// Wallet that approves everything. With no real players on a headless
/// node, refusing payments would only mask the paths being exercised.
struct HeadlessEconomy;

#[async_trait]
impl Economy for HeadlessEconomy {
    async fn has(&self, _player: PlayerId, _amount: Money) -> bool {
        true
    }

    async fn withdraw(&self, player: PlayerId, amount: Money) -> bool {
        debug!(%player, %amount, "headless withdraw");
        true
    }

    async fn deposit(&self, player: PlayerId, amount: Money) -> bool {
        debug!(%player, %amount, "headless deposit");
        true
    }
}

/// Directory with no sessions: nobody resolves, nobody is online, and
/// messages go to the log.
struct HeadlessDirectory;

#[async_trait]
impl PlayerDirectory for HeadlessDirectory {
    async fn resolve_id(&self, _name: &str) -> Option<PlayerId> {
        None
    }

    async fn resolve_name(&self, _player: PlayerId) -> Option<String> {
        None
    }

    async fn is_online(&self, _player: PlayerId) -> bool {
        false
    }

    async fn send_message(&self, player: PlayerId, text: &str) {
        debug!(%player, text, "headless message");
    }

    async fn broadcast(&self, players: &[PlayerId], text: &str) {
        debug!(count = players.len(), text, "headless broadcast");
    }
}

struct HeadlessVault;

#[async_trait]
impl InventoryVault for HeadlessVault {
    async fn capture(&self, player: PlayerId) {
        debug!(%player, "headless inventory capture");
    }

    async fn restore(&self, player: PlayerId) {
        debug!(%player, "headless inventory restore");
    }

    async fn has_snapshot(&self, _player: PlayerId) -> bool {
        false
    }
}

struct HeadlessHost;

#[async_trait]
impl BattleHost for HeadlessHost {
    async fn equip_loadout(&self, player: PlayerId, items: &[String]) {
        debug!(%player, count = items.len(), "headless loadout");
    }

    async fn set_battle_mode(&self, player: PlayerId) {
        debug!(%player, "headless battle mode on");
    }

    async fn restore_mode(&self, player: PlayerId) {
        debug!(%player, "headless battle mode off");
    }

    async fn relocate(&self, player: PlayerId, location: &NodeLocation) {
        debug!(%player, node = %location.node, "headless relocate");
    }

    async fn apply_effect(&self, player: PlayerId, effect_type: &str, seconds: i32, amplifier: i32) {
        debug!(%player, effect_type, seconds, amplifier, "headless effect");
    }
}
