//! Storage error types.

use thiserror::Error;

/// Errors surfaced by [`GuildStore`](crate::GuildStore) operations.
///
/// Multi-statement operations roll back before returning any of these,
/// so a caller never observes a half-applied write.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another guild already uses the requested name (case-insensitive).
    #[error("guild name is already taken")]
    NameConflict,

    /// The guild, membership or request row addressed does not exist.
    #[error("no matching record")]
    NotFound,

    /// The player already belongs to a guild somewhere in the cluster.
    #[error("player already belongs to a guild")]
    AlreadyInGuild,

    /// The guild is at its member capacity.
    #[error("guild has reached its member limit")]
    MemberLimit,

    /// An identical join request is already pending.
    #[error("join request already pending")]
    DuplicateRequest,

    /// The row read earlier changed or vanished before the write ran.
    #[error("record changed underneath the operation")]
    StaleState,

    /// A balance change would drive the guild below zero without the
    /// admin override.
    #[error("guild balance would drop below zero")]
    InsufficientBalance,

    /// The owner row can only change through an ownership transfer or
    /// guild deletion, never through member removal or role edits.
    #[error("the owner role can only change through an ownership transfer")]
    OwnerImmovable,

    /// Underlying SQLite fault. The transaction, if any, rolled back.
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    /// A stored value could not be decoded back into its domain type.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    /// The connection lock was poisoned by a panicking writer.
    #[error("storage connection lock poisoned")]
    Poisoned,
}
