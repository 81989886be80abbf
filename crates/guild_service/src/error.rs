//! Error types for guild operations.
//!
//! Every player-facing operation resolves to exactly one tagged result:
//! `Ok` or one specific [`GuildError`] variant with enough payload to
//! render a message. Storage faults never escape raw; they are logged
//! with operation context and wrapped in [`GuildError::Storage`].

use guild_store::StoreError;
use guild_types::Money;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuildError {
    #[error("No such guild, player or record")]
    NotFound,

    #[error("Already exists or already pending")]
    Conflict,

    #[error("Not allowed for this role")]
    PermissionDenied,

    #[error("Insufficient funds: {required} required")]
    InsufficientFunds { required: Money },

    #[error("Player already belongs to a guild")]
    AlreadyInGuild,

    #[error("Player does not belong to a guild")]
    NotInGuild,

    #[error("Guild has reached its member limit")]
    MemberLimit,

    #[error("State changed before the operation could finish")]
    StaleState,

    #[error("Nothing to confirm")]
    NoPendingAction,

    #[error("A teleport is already underway")]
    TeleportPending,

    #[error("The destination belongs to another node")]
    WrongNode,

    #[error("A match is already running on this node")]
    MatchActive,

    #[error("No match in progress")]
    NoMatch,

    #[error("Player is not part of this match")]
    NotParticipant,

    #[error("Unknown buff: {0}")]
    UnknownBuff(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage failure: {0}")]
    Storage(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Store errors with a direct user-facing meaning translate to their
/// service-level twin; everything else stays wrapped as a storage
/// failure for the caller to render generically.
impl From<StoreError> for GuildError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NameConflict | StoreError::DuplicateRequest => GuildError::Conflict,
            StoreError::NotFound => GuildError::NotFound,
            StoreError::AlreadyInGuild => GuildError::AlreadyInGuild,
            StoreError::MemberLimit => GuildError::MemberLimit,
            StoreError::StaleState => GuildError::StaleState,
            StoreError::OwnerImmovable => GuildError::PermissionDenied,
            other => GuildError::Storage(other),
        }
    }
}

pub type GuildResult<T> = Result<T, GuildError>;
