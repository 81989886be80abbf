//! # Guild Store
//!
//! SQLite persistence for the guild system: guilds, memberships, join
//! requests, the append-only bank ledger and match history. This crate
//! is the single source of truth; caches elsewhere are advisory and
//! re-sync from here.
//!
//! All operations are synchronous and internally serialized through one
//! connection, which totally orders writes on a node. Multi-statement
//! operations are transactional: they commit whole or not at all.

pub mod error;
pub mod records;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use records::{
    GuildRecord, JoinRequest, LedgerEntry, LevelProgress, MatchRecord, MemberRecord,
};
pub use store::GuildStore;

#[cfg(test)]
mod tests;
