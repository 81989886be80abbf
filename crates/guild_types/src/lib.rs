//! # Guild Cluster Core Types
//!
//! Shared identifier and value types used by every crate in the guild
//! cluster workspace. These are the building blocks the store, the wire
//! protocol and the service layer all agree on.
//!
//! ## Key Types
//!
//! - [`PlayerId`] - Unique identifier for players, shared cluster-wide
//! - [`GuildId`] - Store-assigned guild identifier
//! - [`GuildRole`] - Membership role (Owner / Admin / Member)
//! - [`Money`] - Fixed-precision currency amount in minor units
//! - [`NodeLocation`] - A teleport anchor owned by a specific node
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (PlayerId vs GuildId)
//! - **Fixed Precision**: Currency never travels as floats internally
//! - **Serialization**: All types serialize with serde for config and storage

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a player, stable across every node in the cluster.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// player IDs cannot be confused with guild IDs or other identifiers.
///
/// # Examples
///
/// ```rust
/// use guild_types::PlayerId;
///
/// let player_id = PlayerId::new();
/// println!("Player ID: {}", player_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player ID from its string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned guild identifier.
///
/// Guild IDs are allocated by the persistent store on guild creation and
/// referenced everywhere else, including the wire protocol where they
/// travel as signed 32-bit integers (`-1` is reserved as the "no guild"
/// sentinel on the wire and never assigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(pub i32);

impl GuildId {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Membership role inside a guild.
///
/// Every guild has exactly one [`GuildRole::Owner`] at all times (except
/// inside the atomic window of an ownership transfer). Admins and the
/// Owner together form the guild's staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuildRole {
    Owner,
    Admin,
    Member,
}

impl GuildRole {
    /// Stable storage/wire spelling of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuildRole::Owner => "OWNER",
            GuildRole::Admin => "ADMIN",
            GuildRole::Member => "MEMBER",
        }
    }

    /// Parses the storage spelling back into a role.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OWNER" => Some(GuildRole::Owner),
            "ADMIN" => Some(GuildRole::Admin),
            "MEMBER" => Some(GuildRole::Member),
            _ => None,
        }
    }

    /// Staff roles are allowed to manage requests, invites and kicks.
    pub fn is_staff(&self) -> bool {
        matches!(self, GuildRole::Owner | GuildRole::Admin)
    }
}

impl std::fmt::Display for GuildRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a bank-ledger entry.
///
/// The ledger is append-only; every balance change is recorded as either a
/// deposit or a withdrawal with the amount that was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerDirection {
    Deposit,
    Withdraw,
}

impl LedgerDirection {
    /// Stable storage/wire spelling of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerDirection::Deposit => "deposit",
            LedgerDirection::Withdraw => "withdraw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(LedgerDirection::Deposit),
            "withdraw" => Some(LedgerDirection::Withdraw),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Currency
// ============================================================================

/// A fixed-precision currency amount.
///
/// Stored as an `i64` count of minor units (hundredths), so balances never
/// accumulate float drift. The wire protocol and the economy collaborator
/// speak f64 major units; conversion happens only at those edges via
/// [`Money::from_major`] / [`Money::to_major`].
///
/// # Examples
///
/// ```rust
/// use guild_types::Money;
///
/// let price = Money::from_major(10_000.0);
/// assert_eq!(price.to_major(), 10_000.0);
/// assert_eq!(format!("{}", Money::from_minor(1_050)), "10.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Builds an amount from raw minor units (hundredths).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Builds an amount from major units, rounding to the nearest minor unit.
    pub fn from_major(major: f64) -> Self {
        Self((major * 100.0).round() as i64)
    }

    pub const fn minor(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn saturating_add(&self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// The signed delta that moves `self` to `target`.
    pub fn delta_to(&self, target: Money) -> Money {
        Money(target.0 - self.0)
    }

    pub fn negated(&self) -> Money {
        Money(-self.0)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// Config files and JSON columns carry major units as plain numbers.
impl Serialize for Money {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = f64::deserialize(deserializer)?;
        Ok(Money::from_major(major))
    }
}

// ============================================================================
// Locations
// ============================================================================

/// A stored location that belongs to one specific node.
///
/// Guild teleport anchors carry the identifier of the node that owns the
/// coordinates; a node must refuse to teleport a player into coordinates
/// it does not host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLocation {
    /// Identifier of the node hosting these coordinates.
    pub node: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl NodeLocation {
    pub fn new(node: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            node: node.into(),
            x,
            y,
            z,
        }
    }

    /// True when these coordinates are hosted by `node_id`.
    pub fn owned_by(&self, node_id: &str) -> bool {
        self.node == node_id
    }
}

impl std::fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@({:.1}, {:.1}, {:.1})", self.node, self.x, self.y, self.z)
    }
}

// ============================================================================
// Time
// ============================================================================

/// Returns the current Unix timestamp in seconds.
///
/// All persisted timestamps in the cluster use this single generation
/// method so rows written by different nodes stay comparable. Signed to
/// match the storage engine's native integer type.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch.
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}
