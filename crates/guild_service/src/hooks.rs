//! Collaborator interfaces the host process implements.
//!
//! The guild system deliberately knows nothing about wallets, player
//! sessions, inventories or world movement beyond these traits. The
//! embedding server wires real implementations in at bootstrap; tests
//! substitute mocks. All calls happen on the async context, never from
//! inside a storage worker.

use std::sync::Arc;

use async_trait::async_trait;
use guild_types::{Money, NodeLocation, PlayerId};
use guild_wire::BusMessage;

/// The player wallet service. Balances live outside the guild system;
/// only deltas cross this boundary.
#[async_trait]
pub trait Economy: Send + Sync {
    /// Whether the player can cover `amount`.
    async fn has(&self, player: PlayerId, amount: Money) -> bool;

    /// Debits the player. `false` means nothing was taken.
    async fn withdraw(&self, player: PlayerId, amount: Money) -> bool;

    /// Credits the player. Also used for compensating refunds when an
    /// operation fails after its withdrawal.
    async fn deposit(&self, player: PlayerId, amount: Money) -> bool;
}

/// Session and identity lookups plus player-visible messaging.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    /// Resolves a display name to an id, if this node knows the player.
    async fn resolve_id(&self, name: &str) -> Option<PlayerId>;

    /// Resolves an id back to a display name.
    async fn resolve_name(&self, player: PlayerId) -> Option<String>;

    /// Whether the player is connected to this node right now.
    async fn is_online(&self, player: PlayerId) -> bool;

    /// Sends one line to one player. Best-effort; offline players miss it.
    async fn send_message(&self, player: PlayerId, text: &str);

    /// Sends one line to each listed player.
    async fn broadcast(&self, players: &[PlayerId], text: &str);
}

/// Inventory snapshot service for battles.
///
/// The vault owns the opaque snapshot bytes, keyed by player; the guild
/// system only decides when to capture and when to restore.
#[async_trait]
pub trait InventoryVault: Send + Sync {
    /// Snapshots the player's inventory, replacing any prior snapshot.
    async fn capture(&self, player: PlayerId);

    /// Restores and consumes the stored snapshot. Without one this is a
    /// no-op.
    async fn restore(&self, player: PlayerId);

    /// Whether an unconsumed snapshot exists for the player.
    async fn has_snapshot(&self, player: PlayerId) -> bool;
}

/// World-side effects: equipment, game modes, movement and timed
/// effects. Used by battles, teleports and purchased buffs.
#[async_trait]
pub trait BattleHost: Send + Sync {
    /// Replaces the player's held equipment with the given item tags.
    async fn equip_loadout(&self, player: PlayerId, items: &[String]);

    /// Puts the player into the restricted battle game-mode.
    async fn set_battle_mode(&self, player: PlayerId);

    /// Returns the player to their normal game-mode.
    async fn restore_mode(&self, player: PlayerId);

    /// Moves the player to a location on this node.
    async fn relocate(&self, player: PlayerId, location: &NodeLocation);

    /// Applies a timed effect (from the buff catalogue) to the player.
    async fn apply_effect(&self, player: PlayerId, effect_type: &str, seconds: i32, amplifier: i32);
}

/// Outbound half of the inter-node bus. Implementations deliver to the
/// rest of the cluster; the local node applies its own effects directly
/// and never hears its own messages back.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Dispatches one message cluster-wide. Best-effort and
    /// unacknowledged; a lost message self-heals on the next connect or
    /// authoritative read.
    async fn publish(&self, message: BusMessage);
}

/// Publisher for single-node deployments: messages go nowhere.
pub struct NullBus;

#[async_trait]
impl BusPublisher for NullBus {
    async fn publish(&self, _message: BusMessage) {}
}

/// The full set of host services, bundled so construction sites stay
/// readable.
pub struct Collaborators {
    pub economy: Arc<dyn Economy>,
    pub directory: Arc<dyn PlayerDirectory>,
    pub vault: Arc<dyn InventoryVault>,
    pub host: Arc<dyn BattleHost>,
    pub bus: Arc<dyn BusPublisher>,
}
