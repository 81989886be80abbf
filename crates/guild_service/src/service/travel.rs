//! Guild hall travel.
//!
//! A teleport is a warmup timer plus a completion pass that re-checks
//! everything the warmup assumed. The fee is only taken at completion,
//! after the destination is known to be reachable from this node.

use std::sync::Arc;

use guild_types::{GuildId, Money, NodeLocation, PlayerId};
use tracing::debug;

use crate::error::{GuildError, GuildResult};
use crate::timer::TimerHandle;

use super::GuildService;

impl GuildService {
    /// Owner pins the guild hall to a location on some node.
    pub async fn set_teleport_anchor(
        &self,
        actor: PlayerId,
        location: NodeLocation,
    ) -> GuildResult<()> {
        let membership = self.require_owner(actor).await?;
        let guild = membership.guild_id;
        self.store
            .run(move |s| s.set_teleport_location(guild, &location))
            .await?;
        self.notify_guild(guild, "The guild hall anchor has moved.")
            .await;
        Ok(())
    }

    /// Starts a teleport to the caller's guild hall. Returns the
    /// warmup length in milliseconds for the countdown line.
    pub async fn teleport(self: &Arc<Self>, player: PlayerId) -> GuildResult<u64> {
        if self.teleports.contains_key(&player) {
            return Err(GuildError::TeleportPending);
        }
        let membership = self.require_membership(player).await?;
        let guild = membership.guild_id;
        let record = self
            .store
            .run(move |s| s.guild_by_id(guild))
            .await?
            .ok_or(GuildError::NotFound)?;
        let anchor = record.teleport_location.ok_or_else(|| {
            GuildError::InvalidInput("your guild has not set a hall anchor".into())
        })?;

        if !anchor.owned_by(&self.node_id) {
            return Err(GuildError::WrongNode);
        }
        let fee = self.teleport_fee(record.level);
        if !self.economy.has(player, fee).await {
            return Err(GuildError::InsufficientFunds { required: fee });
        }

        let warmup_ms = self.config.timing.teleport_warmup_ms;
        let service = Arc::clone(self);
        let timer = TimerHandle::run_after(
            std::time::Duration::from_millis(warmup_ms),
            async move {
                service.complete_teleport(player, guild).await;
            },
        );
        self.teleports.insert(player, timer);
        debug!(player = %player, guild = %guild, "teleport warmup started");
        Ok(warmup_ms)
    }

    /// Drops the caller's warmup, if one is running.
    pub fn cancel_teleport(&self, player: PlayerId) -> bool {
        match self.teleports.remove(&player) {
            Some((_, timer)) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// End of the warmup. Every precondition is re-checked because a
    /// whole warmup's worth of world state has moved underneath us;
    /// failures turn into messages, never charges.
    async fn complete_teleport(&self, player: PlayerId, guild: GuildId) {
        if self.teleports.remove(&player).is_none() {
            // Canceled while the timer was firing.
            return;
        }

        let membership = match self.store.run(move |s| s.membership_of(player)).await {
            Ok(Some(m)) if m.guild_id == guild => m,
            _ => {
                self.notify_player(player, "Teleport canceled: you left the guild.")
                    .await;
                return;
            }
        };
        let record = match self.store.run(move |s| s.guild_by_id(guild)).await {
            Ok(Some(record)) => record,
            _ => {
                self.notify_player(player, "Teleport canceled: the guild no longer exists.")
                    .await;
                return;
            }
        };
        let anchor = match record.teleport_location {
            Some(anchor) if anchor.owned_by(&self.node_id) => anchor,
            Some(_) => {
                self.notify_player(player, "Teleport canceled: the hall moved to another world.")
                    .await;
                return;
            }
            None => {
                self.notify_player(player, "Teleport canceled: the hall anchor was removed.")
                    .await;
                return;
            }
        };

        let fee = self.teleport_fee(record.level);
        if !self.economy.withdraw(player, fee).await {
            self.notify_player(player, &format!("Teleport canceled: it costs {fee}."))
                .await;
            return;
        }

        self.host.relocate(player, &anchor).await;
        debug!(player = %player, guild = %membership.guild_id, "teleport completed");
        self.notify_player(player, &format!("Welcome to the {} hall.", record.name))
            .await;
    }

    /// Base fee minus a per-level discount, floored at zero.
    fn teleport_fee(&self, level: i32) -> Money {
        let base = self.config.costs.teleport_base.minor();
        let discount = self
            .config
            .costs
            .teleport_discount_per_level
            .minor()
            .saturating_mul(i64::from(level.max(1) - 1));
        Money::from_minor((base - discount).max(0))
    }
}
