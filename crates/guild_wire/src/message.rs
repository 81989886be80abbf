//! The subchannel catalogue: every message the bus can carry.
//!
//! Each variant encodes to its subchannel tag (a length-prefixed string)
//! followed by the variant's fields in declaration order. Receivers
//! dispatch on the tag; an unknown tag is an error for the caller to log
//! and drop, never a panic.

use crate::codec::{FieldReader, FieldWriter};
use crate::error::WireError;
use guild_types::{GuildId, LedgerDirection, Money, PlayerId};

/// Wire sentinel for "no guild" in [`BusMessage::SyncCache`].
pub const NO_GUILD: i32 = -1;

/// Subchannel tag constants, exactly as they travel on the wire.
pub mod tags {
    pub const HELLO: &str = "Hello";
    pub const CHAT: &str = "Chat";
    pub const SYNC_CACHE: &str = "SyncCache";
    pub const CLEAR_GUILD: &str = "CLEAR_GUILD";
    pub const NOTIFY_REQUEST: &str = "NotifyRequest";
    pub const CROSS_INVITE: &str = "CrossInvite";
    pub const MEMBER_JOIN: &str = "MemberJoin";
    pub const MEMBER_LEAVE: &str = "MemberLeave";
    pub const MEMBER_KICK: &str = "MemberKick";
    pub const RENAME_SYNC: &str = "RenameSync";
    pub const ADMIN_RENAME_SYNC: &str = "AdminRenameSync";
    pub const BANK_SYNC: &str = "BankSync";
    pub const BUFF_SYNC: &str = "BuffSync";
    pub const DELETE_SYNC: &str = "DeleteSync";
}

/// A typed bus message.
///
/// Delivery is best-effort and unacknowledged: a missed message only
/// leaves a stale cache entry that self-heals on the next player
/// (re)connect or the next authoritative store read.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Relay handshake; first frame on every node connection.
    Hello { node_id: String, channel: String },
    /// Guild chat line for members of `guild`.
    Chat {
        guild: GuildId,
        sender: String,
        text: String,
    },
    /// Set (or clear, when `guild` is `None`) one player's cache entry.
    SyncCache {
        player: PlayerId,
        guild: Option<GuildId>,
    },
    /// Remove every local cache entry pointing at `guild`.
    ClearGuild { guild: GuildId },
    /// A join application arrived; staff of `guild` should be told.
    NotifyRequest {
        guild: GuildId,
        guild_name: String,
        applicant: String,
    },
    /// Invite a player who may be connected to another node.
    CrossInvite {
        target_name: String,
        guild: GuildId,
        guild_name: String,
        inviter: String,
    },
    /// Status line fan-out for a join.
    MemberJoin { guild: GuildId, player_name: String },
    /// Status line fan-out for a voluntary leave.
    MemberLeave { guild: GuildId, player_name: String },
    /// Kick fan-out; also clears the named player's cache entry.
    MemberKick { guild: GuildId, player_name: String },
    /// Display-name change by the guild itself.
    RenameSync { guild: GuildId, new_name: String },
    /// Display-name change performed by an administrator.
    AdminRenameSync { guild: GuildId, new_name: String },
    /// Bank ledger change fan-out.
    BankSync {
        guild: GuildId,
        player_name: String,
        direction: LedgerDirection,
        amount: Money,
    },
    /// Apply a purchased timed effect to online members of `guild`.
    BuffSync {
        guild: GuildId,
        effect_type: String,
        seconds: i32,
        amplifier: i32,
        buyer_name: String,
        buff_name: String,
    },
    /// The guild is gone; clear entries and tell affected players.
    DeleteSync { guild: GuildId },
}

impl BusMessage {
    /// The subchannel tag this message travels under.
    pub fn tag(&self) -> &'static str {
        match self {
            BusMessage::Hello { .. } => tags::HELLO,
            BusMessage::Chat { .. } => tags::CHAT,
            BusMessage::SyncCache { .. } => tags::SYNC_CACHE,
            BusMessage::ClearGuild { .. } => tags::CLEAR_GUILD,
            BusMessage::NotifyRequest { .. } => tags::NOTIFY_REQUEST,
            BusMessage::CrossInvite { .. } => tags::CROSS_INVITE,
            BusMessage::MemberJoin { .. } => tags::MEMBER_JOIN,
            BusMessage::MemberLeave { .. } => tags::MEMBER_LEAVE,
            BusMessage::MemberKick { .. } => tags::MEMBER_KICK,
            BusMessage::RenameSync { .. } => tags::RENAME_SYNC,
            BusMessage::AdminRenameSync { .. } => tags::ADMIN_RENAME_SYNC,
            BusMessage::BankSync { .. } => tags::BANK_SYNC,
            BusMessage::BuffSync { .. } => tags::BUFF_SYNC,
            BusMessage::DeleteSync { .. } => tags::DELETE_SYNC,
        }
    }

    /// Serializes the message into a bus payload (tag + ordered fields).
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = FieldWriter::new();
        w.put_str(self.tag())?;
        match self {
            BusMessage::Hello { node_id, channel } => {
                w.put_str(node_id)?;
                w.put_str(channel)?;
            }
            BusMessage::Chat {
                guild,
                sender,
                text,
            } => {
                w.put_i32(guild.0);
                w.put_str(sender)?;
                w.put_str(text)?;
            }
            BusMessage::SyncCache { player, guild } => {
                w.put_str(&player.to_string())?;
                w.put_i32(guild.map_or(NO_GUILD, |g| g.0));
            }
            BusMessage::ClearGuild { guild } => {
                w.put_i32(guild.0);
            }
            BusMessage::NotifyRequest {
                guild,
                guild_name,
                applicant,
            } => {
                w.put_i32(guild.0);
                w.put_str(guild_name)?;
                w.put_str(applicant)?;
            }
            BusMessage::CrossInvite {
                target_name,
                guild,
                guild_name,
                inviter,
            } => {
                w.put_str(target_name)?;
                w.put_i32(guild.0);
                w.put_str(guild_name)?;
                w.put_str(inviter)?;
            }
            BusMessage::MemberJoin { guild, player_name }
            | BusMessage::MemberLeave { guild, player_name }
            | BusMessage::MemberKick { guild, player_name } => {
                w.put_i32(guild.0);
                w.put_str(player_name)?;
            }
            BusMessage::RenameSync { guild, new_name }
            | BusMessage::AdminRenameSync { guild, new_name } => {
                w.put_i32(guild.0);
                w.put_str(new_name)?;
            }
            BusMessage::BankSync {
                guild,
                player_name,
                direction,
                amount,
            } => {
                w.put_i32(guild.0);
                w.put_str(player_name)?;
                w.put_str(direction.as_str())?;
                w.put_f64(amount.to_major());
            }
            BusMessage::BuffSync {
                guild,
                effect_type,
                seconds,
                amplifier,
                buyer_name,
                buff_name,
            } => {
                w.put_i32(guild.0);
                w.put_str(effect_type)?;
                w.put_i32(*seconds);
                w.put_i32(*amplifier);
                w.put_str(buyer_name)?;
                w.put_str(buff_name)?;
            }
            BusMessage::DeleteSync { guild } => {
                w.put_i32(guild.0);
            }
        }
        Ok(w.finish())
    }

    /// Parses one bus payload back into a typed message.
    pub fn decode(payload: &[u8]) -> Result<BusMessage, WireError> {
        let mut r = FieldReader::new(payload);
        let tag = r.take_str()?;
        let message = match tag.as_str() {
            tags::HELLO => BusMessage::Hello {
                node_id: r.take_str()?,
                channel: r.take_str()?,
            },
            tags::CHAT => BusMessage::Chat {
                guild: GuildId(r.take_i32()?),
                sender: r.take_str()?,
                text: r.take_str()?,
            },
            tags::SYNC_CACHE => {
                let player = PlayerId::parse(&r.take_str()?)?;
                let raw = r.take_i32()?;
                BusMessage::SyncCache {
                    player,
                    guild: if raw == NO_GUILD { None } else { Some(GuildId(raw)) },
                }
            }
            tags::CLEAR_GUILD => BusMessage::ClearGuild {
                guild: GuildId(r.take_i32()?),
            },
            tags::NOTIFY_REQUEST => BusMessage::NotifyRequest {
                guild: GuildId(r.take_i32()?),
                guild_name: r.take_str()?,
                applicant: r.take_str()?,
            },
            tags::CROSS_INVITE => BusMessage::CrossInvite {
                target_name: r.take_str()?,
                guild: GuildId(r.take_i32()?),
                guild_name: r.take_str()?,
                inviter: r.take_str()?,
            },
            tags::MEMBER_JOIN => BusMessage::MemberJoin {
                guild: GuildId(r.take_i32()?),
                player_name: r.take_str()?,
            },
            tags::MEMBER_LEAVE => BusMessage::MemberLeave {
                guild: GuildId(r.take_i32()?),
                player_name: r.take_str()?,
            },
            tags::MEMBER_KICK => BusMessage::MemberKick {
                guild: GuildId(r.take_i32()?),
                player_name: r.take_str()?,
            },
            tags::RENAME_SYNC => BusMessage::RenameSync {
                guild: GuildId(r.take_i32()?),
                new_name: r.take_str()?,
            },
            tags::ADMIN_RENAME_SYNC => BusMessage::AdminRenameSync {
                guild: GuildId(r.take_i32()?),
                new_name: r.take_str()?,
            },
            tags::BANK_SYNC => {
                let guild = GuildId(r.take_i32()?);
                let player_name = r.take_str()?;
                let raw_direction = r.take_str()?;
                let direction = LedgerDirection::parse(&raw_direction)
                    .ok_or(WireError::UnknownDirection(raw_direction))?;
                BusMessage::BankSync {
                    guild,
                    player_name,
                    direction,
                    amount: Money::from_major(r.take_f64()?),
                }
            }
            tags::BUFF_SYNC => BusMessage::BuffSync {
                guild: GuildId(r.take_i32()?),
                effect_type: r.take_str()?,
                seconds: r.take_i32()?,
                amplifier: r.take_i32()?,
                buyer_name: r.take_str()?,
                buff_name: r.take_str()?,
            },
            tags::DELETE_SYNC => BusMessage::DeleteSync {
                guild: GuildId(r.take_i32()?),
            },
            _ => return Err(WireError::UnknownSubchannel(tag)),
        };
        r.expect_end()?;
        Ok(message)
    }
}
