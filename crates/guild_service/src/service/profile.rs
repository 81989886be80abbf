//! Guild identity: name, announcement, icon, and guild chat.

use guild_types::PlayerId;
use guild_wire::BusMessage;
use tracing::info;

use crate::error::{GuildError, GuildResult};

use super::GuildService;

const ANNOUNCEMENT_MAX_CHARS: usize = 256;

impl GuildService {
    /// Owner renames the guild for a fee. The fee comes back if the
    /// new name loses a race to another founder.
    pub async fn rename(&self, actor: PlayerId, new_name: &str) -> GuildResult<String> {
        let membership = self.require_owner(actor).await?;
        let guild = membership.guild_id;
        let new_name = self.validate_name(new_name)?;

        let fee = self.config.costs.rename;
        if !self.economy.withdraw(actor, fee).await {
            return Err(GuildError::InsufficientFunds { required: fee });
        }

        let renamed = self
            .store
            .run({
                let new_name = new_name.clone();
                move |s| s.rename_guild(guild, &new_name)
            })
            .await;
        if let Err(e) = renamed {
            self.refund(actor, fee).await;
            return Err(e);
        }

        self.notify_guild(guild, &format!("The guild is now called {new_name}."))
            .await;
        self.publish(BusMessage::RenameSync {
            guild,
            new_name: new_name.clone(),
        })
        .await;
        info!(guild = %guild, name = %new_name, "guild renamed");
        Ok(new_name)
    }

    /// Operator-console rename, keyed by current name. No fee.
    pub async fn admin_rename(
        &self,
        actor_label: &str,
        old_name: &str,
        new_name: &str,
    ) -> GuildResult<String> {
        let new_name = self.validate_name(new_name)?;
        let record = self.guild_by_name(old_name).await?;
        let guild = record.id;

        self.store
            .run({
                let new_name = new_name.clone();
                move |s| s.rename_guild(guild, &new_name)
            })
            .await?;

        self.notify_guild(guild, &format!("An operator renamed the guild to {new_name}."))
            .await;
        self.publish(BusMessage::AdminRenameSync {
            guild,
            new_name: new_name.clone(),
        })
        .await;
        info!(guild = %guild, actor = actor_label, name = %new_name, "guild renamed by operator");
        Ok(new_name)
    }

    /// Staff sets the announcement shown to members at login. An empty
    /// string clears it.
    pub async fn set_announcement(&self, actor: PlayerId, text: &str) -> GuildResult<()> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let text = text.trim().to_string();
        if text.chars().count() > ANNOUNCEMENT_MAX_CHARS {
            return Err(GuildError::InvalidInput(format!(
                "announcements are limited to {ANNOUNCEMENT_MAX_CHARS} characters"
            )));
        }

        self.store
            .run({
                let text = text.clone();
                move |s| s.set_announcement(guild, &text)
            })
            .await?;

        if !text.is_empty() {
            self.notify_guild(guild, &format!("Announcement: {text}")).await;
        }
        Ok(())
    }

    /// Staff sets the emblem identifier shown in listings.
    pub async fn set_icon(&self, actor: PlayerId, icon: &str) -> GuildResult<()> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        let icon = icon.trim().to_string();
        self.store.run(move |s| s.set_icon(guild, &icon)).await
    }

    /// Guild chat. The cache answers the membership question on the
    /// hot path; a miss falls back to the store and back-fills.
    pub async fn chat(&self, player: PlayerId, text: &str) -> GuildResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GuildError::InvalidInput("say something".into()));
        }

        let guild = match self.cache.get(player) {
            Some(guild) => guild,
            None => {
                let guild = self
                    .store
                    .run(move |s| s.guild_id_by_player(player))
                    .await?
                    .ok_or(GuildError::NotInGuild)?;
                self.cache.set(player, guild);
                guild
            }
        };

        let sender = self.display_name(player).await;
        let line = format!("[Guild] {sender}: {text}");
        self.notify_guild(guild, &line).await;
        self.publish(BusMessage::Chat {
            guild,
            sender,
            text: text.to_string(),
        })
        .await;
        Ok(())
    }
}
