//! Read-only views: guild profiles, rankings, ledgers, and history.

use guild_store::{GuildRecord, JoinRequest, LedgerEntry, MatchRecord, MemberRecord};
use guild_types::PlayerId;

use crate::error::{GuildError, GuildResult};

use super::GuildService;

/// A guild profile with its roster, ordered owner first.
#[derive(Debug, Clone)]
pub struct GuildOverview {
    pub record: GuildRecord,
    pub members: Vec<MemberRecord>,
}

impl GuildService {
    /// The caller's own guild, or `NotInGuild`.
    pub async fn my_guild(&self, player: PlayerId) -> GuildResult<GuildOverview> {
        let membership = self.require_membership(player).await?;
        self.overview(membership.guild_id).await
    }

    /// Public profile lookup by name.
    pub async fn overview_of(&self, guild_name: &str) -> GuildResult<GuildOverview> {
        let record = self.guild_by_name(guild_name).await?;
        self.overview(record.id).await
    }

    async fn overview(&self, guild: guild_types::GuildId) -> GuildResult<GuildOverview> {
        let record = self
            .store
            .run(move |s| s.guild_by_id(guild))
            .await?
            .ok_or(GuildError::NotFound)?;
        let members = self.store.run(move |s| s.members(guild)).await?;
        Ok(GuildOverview { record, members })
    }

    /// The ranking board: level, then experience, then battle wins.
    pub async fn top_guilds(&self) -> GuildResult<Vec<GuildRecord>> {
        let limit = self.config.limits.page_size;
        self.store.run(move |s| s.top_guilds(limit)).await
    }

    /// One page of the caller's guild ledger, newest first. Pages are
    /// zero-based.
    pub async fn ledger_page(&self, player: PlayerId, page: u32) -> GuildResult<Vec<LedgerEntry>> {
        let membership = self.require_membership(player).await?;
        let guild = membership.guild_id;
        let per_page = self.config.limits.page_size;
        self.store
            .run(move |s| s.ledger_page(guild, page, per_page))
            .await
    }

    /// One page of the caller's guild battle record, newest first.
    pub async fn match_history_page(
        &self,
        player: PlayerId,
        page: u32,
    ) -> GuildResult<Vec<MatchRecord>> {
        let membership = self.require_membership(player).await?;
        let guild = membership.guild_id;
        let per_page = self.config.limits.page_size;
        self.store
            .run(move |s| s.match_history_page(guild, page, per_page))
            .await
    }

    /// Staff view of the open applications, oldest first.
    pub async fn pending_requests(&self, actor: PlayerId) -> GuildResult<Vec<JoinRequest>> {
        let membership = self.require_staff(actor).await?;
        let guild = membership.guild_id;
        self.store.run(move |s| s.list_requests(guild)).await
    }
}
