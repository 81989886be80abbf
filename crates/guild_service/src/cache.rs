//! Per-node player-to-guild cache and pending invites.
//!
//! The cache is an authorization shortcut and a notification target
//! list, never an authority: destructive and financial checks re-read
//! the store. Entries appear on player connect, go away on disconnect,
//! and are patched by both local operations and inbound bus messages.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use guild_types::{GuildId, PlayerId};

/// A claimable invitation with a read-time expiry.
#[derive(Debug, Clone)]
pub struct PendingInvite {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub inviter_name: String,
    pub expires_at: Instant,
}

impl PendingInvite {
    pub fn new(
        guild_id: GuildId,
        guild_name: String,
        inviter_name: String,
        ttl: Duration,
    ) -> Self {
        Self {
            guild_id,
            guild_name,
            inviter_name,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe per-node cache. Mutated from the async context and from
/// bus handler tasks; the maps carry their own locking.
#[derive(Default)]
pub struct NodeCache {
    memberships: DashMap<PlayerId, GuildId>,
    invites: DashMap<PlayerId, PendingInvite>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached guild of a player, if any.
    pub fn get(&self, player: PlayerId) -> Option<GuildId> {
        self.memberships.get(&player).map(|entry| *entry.value())
    }

    pub fn set(&self, player: PlayerId, guild: GuildId) {
        self.memberships.insert(player, guild);
    }

    /// Whether this node currently tracks the player at all.
    pub fn contains(&self, player: PlayerId) -> bool {
        self.memberships.contains_key(&player)
    }

    /// Drops the player's membership entry (not their invite).
    pub fn clear(&self, player: PlayerId) {
        self.memberships.remove(&player);
    }

    /// Drops every entry pointing at `guild`, returning the players
    /// that were affected so callers can tell them why.
    pub fn clear_guild(&self, guild: GuildId) -> Vec<PlayerId> {
        let affected: Vec<PlayerId> = self
            .memberships
            .iter()
            .filter(|entry| *entry.value() == guild)
            .map(|entry| *entry.key())
            .collect();
        for player in &affected {
            self.memberships.remove(player);
        }
        affected
    }

    /// Players this node maps to `guild`. The notification target list.
    pub fn members_of(&self, guild: GuildId) -> Vec<PlayerId> {
        self.memberships
            .iter()
            .filter(|entry| *entry.value() == guild)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn put_invite(&self, player: PlayerId, invite: PendingInvite) {
        self.invites.insert(player, invite);
    }

    /// Claims the player's invite. Expiry is checked here, at read
    /// time; an expired invite is dropped and reported as absent.
    pub fn take_invite(&self, player: PlayerId) -> Option<PendingInvite> {
        let (_, invite) = self.invites.remove(&player)?;
        if invite.is_expired() {
            return None;
        }
        Some(invite)
    }

    /// Forgets the player entirely. Called on disconnect.
    pub fn forget(&self, player: PlayerId) {
        self.memberships.remove(&player);
        self.invites.remove(&player);
    }
}
