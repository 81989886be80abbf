//! Row types read back out of the database.

use guild_types::{GuildId, GuildRole, LedgerDirection, Money, NodeLocation, PlayerId};
use rusqlite::Row;

use crate::error::StoreError;

/// One guild row, fully hydrated.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildRecord {
    pub id: GuildId,
    pub name: String,
    pub owner_id: PlayerId,
    pub owner_name: String,
    pub level: i32,
    pub exp: i64,
    pub balance: Money,
    pub announcement: String,
    pub icon: String,
    pub max_members: i32,
    pub create_time: i64,
    pub pvp_wins: i32,
    pub pvp_losses: i32,
    pub pvp_draws: i32,
    pub pvp_total: i32,
    pub teleport_location: Option<NodeLocation>,
}

impl GuildRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let raw_owner: String = row.get("owner_id")?;
        let raw_location: Option<String> = row.get("teleport_location")?;
        Ok(Self {
            id: GuildId(row.get("id")?),
            name: row.get("name")?,
            owner_id: parse_player("owner_id", &raw_owner)?,
            owner_name: row.get("owner_name")?,
            level: row.get("level")?,
            exp: row.get("exp")?,
            balance: Money::from_minor(row.get("balance")?),
            announcement: row.get("announcement")?,
            icon: row.get("icon")?,
            max_members: row.get("max_members")?,
            create_time: row.get("create_time")?,
            pvp_wins: row.get("pvp_wins")?,
            pvp_losses: row.get("pvp_losses")?,
            pvp_draws: row.get("pvp_draws")?,
            pvp_total: row.get("pvp_total")?,
            teleport_location: match raw_location {
                Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
                    StoreError::Corrupt(format!("teleport_location {json:?}: {e}"))
                })?),
                None => None,
            },
        })
    }
}

/// One membership row.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub guild_id: GuildId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub role: GuildRole,
    pub join_time: i64,
}

impl MemberRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let raw_player: String = row.get("player_id")?;
        let raw_role: String = row.get("role")?;
        Ok(Self {
            guild_id: GuildId(row.get("guild_id")?),
            player_id: parse_player("player_id", &raw_player)?,
            player_name: row.get("player_name")?,
            role: GuildRole::parse(&raw_role)
                .ok_or_else(|| StoreError::Corrupt(format!("role {raw_role:?}")))?,
            join_time: row.get("join_time")?,
        })
    }
}

/// One pending join application.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub guild_id: GuildId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub request_time: i64,
}

impl JoinRequest {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let raw_player: String = row.get("player_id")?;
        Ok(Self {
            guild_id: GuildId(row.get("guild_id")?),
            player_id: parse_player("player_id", &raw_player)?,
            player_name: row.get("player_name")?,
            request_time: row.get("request_time")?,
        })
    }
}

/// One append-only bank audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub guild_id: GuildId,
    pub actor_name: String,
    pub direction: LedgerDirection,
    pub amount: Money,
    pub time: i64,
}

impl LedgerEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let raw_direction: String = row.get("direction")?;
        Ok(Self {
            id: row.get("id")?,
            guild_id: GuildId(row.get("guild_id")?),
            actor_name: row.get("actor_name")?,
            direction: LedgerDirection::parse(&raw_direction)
                .ok_or_else(|| StoreError::Corrupt(format!("direction {raw_direction:?}")))?,
            amount: Money::from_minor(row.get("amount")?),
            time: row.get("time")?,
        })
    }
}

/// One finished guild-versus-guild match. `winner` is `None` on a draw.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: i64,
    pub red_guild_id: GuildId,
    pub blue_guild_id: GuildId,
    pub winner_guild_id: Option<GuildId>,
    pub start_time: i64,
    pub end_time: i64,
}

impl MatchRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let winner: Option<i32> = row.get("winner_guild_id")?;
        Ok(Self {
            id: row.get("id")?,
            red_guild_id: GuildId(row.get("red_guild_id")?),
            blue_guild_id: GuildId(row.get("blue_guild_id")?),
            winner_guild_id: winner.map(GuildId),
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
        })
    }
}

/// Outcome of applying experience to a guild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelProgress {
    pub level: i32,
    pub exp: i64,
    pub max_members: i32,
    pub levels_gained: i32,
}

impl LevelProgress {
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }
}

fn parse_player(column: &str, raw: &str) -> Result<PlayerId, StoreError> {
    PlayerId::parse(raw).map_err(|e| StoreError::Corrupt(format!("{column} {raw:?}: {e}")))
}
