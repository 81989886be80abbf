//! Inbound side of the cluster bus.
//!
//! Frames from other nodes mutate only this node's cache and players.
//! The store already holds the truth by the time a sync arrives, so
//! every handler here is idempotent and safe to replay.

use guild_wire::{BusMessage, WireError};
use tracing::{debug, warn};

use crate::cache::PendingInvite;

use super::GuildService;

impl GuildService {
    /// Decodes one relay frame and applies it.
    pub async fn handle_frame(&self, payload: &[u8]) -> Result<(), WireError> {
        let message = BusMessage::decode(payload)?;
        debug!(tag = message.tag(), "bus message received");
        self.apply_remote(message).await;
        Ok(())
    }

    async fn apply_remote(&self, message: BusMessage) {
        match message {
            // The relay consumes handshakes; one here is a peer
            // misbehaving, not a fault of ours.
            BusMessage::Hello { node_id, channel } => {
                warn!(peer = %node_id, channel = %channel, "unexpected handshake on the bus");
            }

            BusMessage::Chat {
                guild,
                sender,
                text,
            } => {
                self.notify_guild(guild, &format!("[Guild] {sender}: {text}"))
                    .await;
            }

            BusMessage::SyncCache { player, guild } => match guild {
                // Adopt the mapping only for players this node knows,
                // so the cache never grows entries it cannot evict.
                Some(id) => {
                    if self.directory.is_online(player).await || self.cache.contains(player) {
                        self.cache.set(player, id);
                    }
                }
                None => self.cache.clear(player),
            },

            BusMessage::ClearGuild { guild } => {
                self.cache.clear_guild(guild);
            }

            BusMessage::NotifyRequest {
                guild,
                guild_name,
                applicant,
            } => {
                self.notify_staff(guild, &format!("{applicant} has applied to join {guild_name}."))
                    .await;
            }

            BusMessage::CrossInvite {
                target_name,
                guild,
                guild_name,
                inviter,
            } => {
                let Some(target) = self.directory.resolve_id(&target_name).await else {
                    return;
                };
                match self.store.run(move |s| s.guild_id_by_player(target)).await {
                    Ok(None) => {}
                    // Already spoken for, or the store is unwell; the
                    // invite quietly dies here.
                    Ok(Some(_)) => return,
                    Err(e) => {
                        warn!(player = %target, error = %e, "cross invite lookup failed");
                        return;
                    }
                }
                self.cache.put_invite(
                    target,
                    PendingInvite::new(
                        guild,
                        guild_name.clone(),
                        inviter.clone(),
                        self.invite_window(),
                    ),
                );
                self.notify_player(
                    target,
                    &format!("{inviter} invited you to join {guild_name}."),
                )
                .await;
            }

            BusMessage::MemberJoin { guild, player_name } => {
                self.notify_guild(guild, &format!("{player_name} has joined the guild."))
                    .await;
            }

            BusMessage::MemberLeave { guild, player_name } => {
                self.notify_guild(guild, &format!("{player_name} has left the guild."))
                    .await;
            }

            BusMessage::MemberKick { guild, player_name } => {
                self.notify_guild(guild, &format!("{player_name} was removed from the guild."))
                    .await;
                if let Some(target) = self.directory.resolve_id(&player_name).await {
                    self.cache.clear(target);
                    self.notify_player(target, "You were removed from your guild.")
                        .await;
                }
            }

            BusMessage::RenameSync { guild, new_name } => {
                self.notify_guild(guild, &format!("The guild is now called {new_name}."))
                    .await;
            }

            BusMessage::AdminRenameSync { guild, new_name } => {
                self.notify_guild(guild, &format!("An operator renamed the guild to {new_name}."))
                    .await;
            }

            BusMessage::BankSync {
                guild,
                player_name,
                direction,
                amount,
            } => {
                let verb = match direction {
                    guild_types::LedgerDirection::Deposit => "deposited",
                    guild_types::LedgerDirection::Withdraw => "withdrew",
                };
                self.notify_guild(guild, &format!("{player_name} {verb} {amount}."))
                    .await;
            }

            BusMessage::BuffSync {
                guild,
                effect_type,
                seconds,
                amplifier,
                buyer_name,
                buff_name,
            } => {
                for player in self.cache.members_of(guild) {
                    if self.directory.is_online(player).await {
                        self.host
                            .apply_effect(player, &effect_type, seconds, amplifier)
                            .await;
                    }
                }
                self.notify_guild(
                    guild,
                    &format!("{buyer_name} activated {buff_name} for the guild!"),
                )
                .await;
            }

            BusMessage::DeleteSync { guild } => {
                let affected = self.cache.clear_guild(guild);
                if !affected.is_empty() {
                    self.directory
                        .broadcast(&affected, "Your guild has been disbanded.")
                        .await;
                }
            }
        }
    }
}
