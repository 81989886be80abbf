//! Guild lifecycle and membership operations.

use guild_store::{GuildRecord, MemberRecord};
use guild_types::{current_timestamp, GuildId, GuildRole, PlayerId};
use guild_wire::BusMessage;
use tracing::info;

use crate::cache::PendingInvite;
use crate::error::{GuildError, GuildResult};
use crate::pending::PendingKind;

use super::GuildService;

/// Where an invitation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The target is on this node and was told directly.
    Delivered,
    /// The target is not here; the invite went out on the bus.
    Forwarded,
}

impl GuildService {
    // ========================================================================
    // Founding and disbanding
    // ========================================================================

    /// Founds a guild. The founding fee is taken before the insert and
    /// refunded if the insert fails for any reason.
    pub async fn create_guild(&self, player: PlayerId, name: &str) -> GuildResult<GuildRecord> {
        let name = self.validate_name(name)?;

        if self.store.run({ let name = name.clone(); move |s| s.guild_name_taken(&name) }).await? {
            return Err(GuildError::Conflict);
        }
        if self.store.run(move |s| s.membership_of(player)).await?.is_some() {
            return Err(GuildError::AlreadyInGuild);
        }

        let cost = self.config.costs.create;
        if !self.economy.withdraw(player, cost).await {
            return Err(GuildError::InsufficientFunds { required: cost });
        }

        let owner_name = self.display_name(player).await;
        let max_members = self.config.limits.max_members_base;
        let created = self
            .store
            .run({
                let name = name.clone();
                move |s| s.create_guild(&name, player, &owner_name, max_members, current_timestamp())
            })
            .await;

        let record = match created {
            Ok(record) => record,
            Err(e) => {
                self.refund(player, cost).await;
                return Err(e);
            }
        };

        self.sync_membership(player, Some(record.id)).await;
        info!(guild = %record.id, name = %record.name, owner = %player, "guild founded");
        Ok(record)
    }

    /// Stages a disband; nothing happens until [`GuildService::confirm`].
    pub async fn request_disband(&self, player: PlayerId) -> GuildResult<String> {
        let membership = self.require_owner(player).await?;
        if self.battle_involves(membership.guild_id).await {
            return Err(GuildError::MatchActive);
        }
        let name = self.guild_name(membership.guild_id).await?;
        self.pending.stage(
            player,
            PendingKind::Disband {
                guild: membership.guild_id,
            },
            self.confirm_window(),
        );
        Ok(name)
    }

    /// Stages an ownership transfer to a current member.
    pub async fn request_transfer(&self, player: PlayerId, heir_name: &str) -> GuildResult<String> {
        let membership = self.require_owner(player).await?;
        let heir = self.member_by_name(membership.guild_id, heir_name).await?;
        if heir.player_id == player {
            return Err(GuildError::InvalidInput(
                "you already own this guild".into(),
            ));
        }
        self.pending.stage(
            player,
            PendingKind::Transfer {
                guild: membership.guild_id,
                heir: heir.player_id,
                heir_name: heir.player_name.clone(),
            },
            self.confirm_window(),
        );
        Ok(heir.player_name)
    }

    /// Drops the caller's staged action, if any.
    pub fn cancel_pending(&self, player: PlayerId) -> bool {
        self.pending.cancel(player)
    }

    // ========================================================================
    // Applications
    // ========================================================================

    /// Applies to join the named guild.
    pub async fn request_join(&self, player: PlayerId, guild_name: &str) -> GuildResult<String> {
        let target = self.guild_by_name(guild_name).await?;
        let player_name = self.display_name(player).await;

        self.store
            .run({
                let player_name = player_name.clone();
                move |s| s.add_request(target.id, player, &player_name, current_timestamp())
            })
            .await?;

        let note = format!("{player_name} has applied to join {}.", target.name);
        self.notify_staff(target.id, &note).await;
        self.publish(BusMessage::NotifyRequest {
            guild: target.id,
            guild_name: target.name.clone(),
            applicant: player_name,
        })
        .await;
        Ok(target.name)
    }

    /// Withdraws the caller's own application.
    pub async fn cancel_request(&self, player: PlayerId, guild_name: &str) -> GuildResult<()> {
        let target = self.guild_by_name(guild_name).await?;
        self.store
            .run(move |s| s.cancel_request(target.id, player))
            .await
    }

    /// Staff accepts a pending application by applicant name.
    pub async fn accept_request(
        &self,
        actor: PlayerId,
        applicant_name: &str,
    ) -> GuildResult<MemberRecord> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let request = self.request_by_name(guild, applicant_name).await?;

        let applicant = request.player_id;
        let member = self
            .store
            .run(move |s| s.accept_request(guild, applicant, current_timestamp()))
            .await?;

        // Cache sync first so the join broadcast reaches the newcomer
        // on every node.
        self.sync_membership(applicant, Some(guild)).await;
        let note = format!("{} has joined the guild.", member.player_name);
        self.notify_guild(guild, &note).await;
        self.publish(BusMessage::MemberJoin {
            guild,
            player_name: member.player_name.clone(),
        })
        .await;
        Ok(member)
    }

    /// Staff declines a pending application by applicant name.
    pub async fn deny_request(&self, actor: PlayerId, applicant_name: &str) -> GuildResult<()> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let request = self.request_by_name(guild, applicant_name).await?;

        let applicant = request.player_id;
        self.store
            .run(move |s| s.deny_request(guild, applicant))
            .await?;

        let name = self.guild_name(guild).await?;
        self.notify_player(applicant, &format!("Your application to {name} was declined."))
            .await;
        Ok(())
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// Staff invites a player by name. Falls back to the cluster when
    /// the target is not on this node.
    pub async fn invite(&self, actor: PlayerId, target_name: &str) -> GuildResult<InviteOutcome> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let guild_name = self.guild_name(guild).await?;
        let inviter_name = membership.player_name.clone();

        if let Some(target) = self.directory.resolve_id(target_name).await {
            if self
                .store
                .run(move |s| s.guild_id_by_player(target))
                .await?
                .is_some()
            {
                return Err(GuildError::AlreadyInGuild);
            }
            self.cache.put_invite(
                target,
                PendingInvite::new(guild, guild_name.clone(), inviter_name.clone(), self.invite_window()),
            );
            self.notify_player(
                target,
                &format!("{inviter_name} invited you to join {guild_name}."),
            )
            .await;
            return Ok(InviteOutcome::Delivered);
        }

        self.publish(BusMessage::CrossInvite {
            target_name: target_name.to_string(),
            guild,
            guild_name,
            inviter: inviter_name,
        })
        .await;
        Ok(InviteOutcome::Forwarded)
    }

    /// Accepts the invitation waiting for the caller, if it has not
    /// expired.
    pub async fn accept_invite(&self, player: PlayerId) -> GuildResult<MemberRecord> {
        let invite = self
            .cache
            .take_invite(player)
            .ok_or(GuildError::NoPendingAction)?;
        let guild = invite.guild_id;
        let player_name = self.display_name(player).await;

        let added = self
            .store
            .run({
                let player_name = player_name.clone();
                move |s| s.add_member(guild, player, &player_name, current_timestamp())
            })
            .await;
        let member = match added {
            Ok(member) => member,
            // Guild dissolved while the invite sat around.
            Err(GuildError::NotFound) => return Err(GuildError::StaleState),
            Err(e) => return Err(e),
        };

        self.sync_membership(player, Some(guild)).await;
        let note = format!("{player_name} has joined the guild.");
        self.notify_guild(guild, &note).await;
        self.publish(BusMessage::MemberJoin {
            guild,
            player_name,
        })
        .await;
        Ok(member)
    }

    /// Discards the invitation waiting for the caller. Returns the
    /// guild name for the acknowledgement line.
    pub fn decline_invite(&self, player: PlayerId) -> GuildResult<String> {
        let invite = self
            .cache
            .take_invite(player)
            .ok_or(GuildError::NoPendingAction)?;
        Ok(invite.guild_name)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes a member. Admins may remove plain members; the owner may
    /// remove anyone but themselves; the owner row is untouchable.
    pub async fn kick(&self, actor: PlayerId, target_name: &str) -> GuildResult<String> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let target = self.member_by_name(guild, target_name).await?;

        if target.player_id == actor {
            return Err(GuildError::InvalidInput(
                "leave the guild instead of removing yourself".into(),
            ));
        }
        if target.role == GuildRole::Owner {
            return Err(GuildError::PermissionDenied);
        }
        if membership.role == GuildRole::Admin && target.role != GuildRole::Member {
            return Err(GuildError::PermissionDenied);
        }

        let removed = target.player_id;
        self.store
            .run(move |s| s.remove_member(guild, removed))
            .await?;

        self.sync_membership(removed, None).await;
        let note = format!("{} was removed from the guild.", target.player_name);
        self.notify_guild(guild, &note).await;
        self.notify_player(removed, "You were removed from your guild.")
            .await;
        self.publish(BusMessage::MemberKick {
            guild,
            player_name: target.player_name.clone(),
        })
        .await;
        info!(guild = %guild, target = %removed, actor = %actor, "member removed");
        Ok(target.player_name)
    }

    /// Leaves the caller's guild. Owners must transfer or disband.
    pub async fn leave(&self, player: PlayerId) -> GuildResult<String> {
        let membership = self.require_membership(player).await?;
        if membership.role == GuildRole::Owner {
            return Err(GuildError::PermissionDenied);
        }
        let guild = membership.guild_id;

        self.store
            .run(move |s| s.remove_member(guild, player))
            .await?;

        self.sync_membership(player, None).await;
        let name = self.guild_name(guild).await.unwrap_or_default();
        let note = format!("{} has left the guild.", membership.player_name);
        self.notify_guild(guild, &note).await;
        self.publish(BusMessage::MemberLeave {
            guild,
            player_name: membership.player_name,
        })
        .await;
        Ok(name)
    }

    // ========================================================================
    // Roles
    // ========================================================================

    /// Owner promotes or demotes a member between ADMIN and MEMBER.
    pub async fn set_role(
        &self,
        actor: PlayerId,
        target_name: &str,
        role: GuildRole,
    ) -> GuildResult<()> {
        let membership = self.require_owner(actor).await?;
        if role == GuildRole::Owner {
            return Err(GuildError::InvalidInput(
                "ownership changes only through a transfer".into(),
            ));
        }
        let guild = membership.guild_id;
        let target = self.member_by_name(guild, target_name).await?;
        if target.player_id == actor {
            return Err(GuildError::InvalidInput(
                "the owner role cannot be changed here".into(),
            ));
        }

        let target_id = target.player_id;
        self.store
            .run(move |s| s.set_role(guild, target_id, role))
            .await?;

        let note = format!("{} is now {}.", target.player_name, role.as_str());
        self.notify_guild(guild, &note).await;
        Ok(())
    }

    // ========================================================================
    // Lookup helpers
    // ========================================================================

    pub(crate) async fn guild_by_name(&self, name: &str) -> GuildResult<GuildRecord> {
        let name = name.trim().to_string();
        self.store
            .run(move |s| s.guild_by_name(&name))
            .await?
            .ok_or(GuildError::NotFound)
    }

    pub(crate) async fn member_by_name(
        &self,
        guild: GuildId,
        name: &str,
    ) -> GuildResult<MemberRecord> {
        let members = self.store.run(move |s| s.members(guild)).await?;
        members
            .into_iter()
            .find(|m| m.player_name.eq_ignore_ascii_case(name.trim()))
            .ok_or(GuildError::NotFound)
    }

    async fn request_by_name(
        &self,
        guild: GuildId,
        applicant_name: &str,
    ) -> GuildResult<guild_store::JoinRequest> {
        let requests = self.store.run(move |s| s.list_requests(guild)).await?;
        requests
            .into_iter()
            .find(|r| r.player_name.eq_ignore_ascii_case(applicant_name.trim()))
            .ok_or(GuildError::NotFound)
    }

    /// Rejects empty, oversized, or control-character names before they
    /// reach the store.
    pub(crate) fn validate_name(&self, name: &str) -> GuildResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GuildError::InvalidInput("guild names cannot be empty".into()));
        }
        if name.chars().count() > self.config.limits.name_max_chars {
            return Err(GuildError::InvalidInput(format!(
                "guild names are limited to {} characters",
                self.config.limits.name_max_chars
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(GuildError::InvalidInput(
                "guild names cannot contain control characters".into(),
            ));
        }
        Ok(name.to_string())
    }
}
