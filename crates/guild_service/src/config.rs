//! Typed, eagerly-validated guild configuration.
//!
//! Everything behavior-shaping lives here: fees, capacity growth,
//! confirmation windows, battle pacing and the buff catalogue. Unknown
//! keys are rejected at parse time and semantic problems at
//! [`GuildConfig::validate`], so a bad value fails the boot instead of
//! a player's command.

use guild_types::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration value that passed parsing but cannot work.
#[derive(Debug, Error)]
#[error("Invalid guild configuration: {0}")]
pub struct ConfigError(String);

impl ConfigError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Complete guild system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuildConfig {
    pub costs: CostConfig,
    pub limits: LimitConfig,
    pub timing: TimingConfig,
    pub battle: BattleConfig,
    /// Purchasable timed effects. Empty disables the buff shop.
    #[serde(default)]
    pub buffs: Vec<BuffSettings>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            costs: CostConfig::default(),
            limits: LimitConfig::default(),
            timing: TimingConfig::default(),
            battle: BattleConfig::default(),
            buffs: vec![],
        }
    }
}

impl GuildConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.name_max_chars == 0 {
            return Err(ConfigError::new("limits.name_max_chars must be at least 1"));
        }
        if self.limits.max_members_base < 1 {
            return Err(ConfigError::new("limits.max_members_base must be at least 1"));
        }
        if self.limits.exp_per_level <= 0 {
            return Err(ConfigError::new("limits.exp_per_level must be positive"));
        }
        if self.limits.page_size == 0 {
            return Err(ConfigError::new("limits.page_size must be at least 1"));
        }
        if self.costs.create.is_negative()
            || self.costs.rename.is_negative()
            || self.costs.teleport_base.is_negative()
            || self.costs.teleport_discount_per_level.is_negative()
        {
            return Err(ConfigError::new("costs must not be negative"));
        }
        if self.timing.confirm_ttl_ms == 0 || self.timing.invite_ttl_ms == 0 {
            return Err(ConfigError::new("confirmation and invite windows must be non-zero"));
        }
        if self.battle.min_participants == 0 {
            return Err(ConfigError::new("battle.min_participants must be at least 1"));
        }
        if self.battle.ready_ms == 0 || self.battle.duration_ms == 0 {
            return Err(ConfigError::new("battle timers must be non-zero"));
        }

        let mut seen = std::collections::HashSet::new();
        for buff in &self.buffs {
            if buff.key.is_empty() {
                return Err(ConfigError::new("buff keys must not be empty"));
            }
            if !seen.insert(buff.key.as_str()) {
                return Err(ConfigError::new(format!("duplicate buff key: {}", buff.key)));
            }
            if buff.seconds <= 0 {
                return Err(ConfigError::new(format!(
                    "buff {} must last a positive number of seconds",
                    buff.key
                )));
            }
            if buff.cost.is_negative() {
                return Err(ConfigError::new(format!("buff {} has a negative cost", buff.key)));
            }
        }

        Ok(())
    }
}

/// Fees charged against the acting player's wallet (creation, rename,
/// teleport) in major currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Charged to the founder when a guild is created.
    pub create: Money,

    /// Charged to the owner for a display-name change.
    pub rename: Money,

    /// Base teleport fee before the level discount.
    pub teleport_base: Money,

    /// Knocked off the teleport fee per guild level above one. The fee
    /// never drops below zero.
    pub teleport_discount_per_level: Money,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            create: Money::from_major(10_000.0),
            rename: Money::from_major(1_000.0),
            teleport_base: Money::from_major(100.0),
            teleport_discount_per_level: Money::from_major(10.0),
        }
    }
}

/// Capacity and progression knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    /// Member capacity of a freshly created guild.
    pub max_members_base: i32,

    /// Extra member slots gained per level.
    pub members_per_level: i32,

    /// Experience needed to leave level `n` is `exp_per_level * n`.
    pub exp_per_level: i64,

    /// Longest accepted guild name, in characters.
    pub name_max_chars: usize,

    /// Rows per page for ledger and match-history listings.
    pub page_size: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_members_base: 10,
            members_per_level: 5,
            exp_per_level: 1_000,
            name_max_chars: 32,
            page_size: 10,
        }
    }
}

/// Time-to-live windows, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// How long a cross-node or local invite stays claimable.
    pub invite_ttl_ms: u64,

    /// Window for confirming a staged destructive action.
    pub confirm_ttl_ms: u64,

    /// Teleport warm-up between request and relocation.
    pub teleport_warmup_ms: u64,

    /// How long a battle challenge stays acceptable.
    pub challenge_ttl_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            invite_ttl_ms: 60_000,
            confirm_ttl_ms: 30_000,
            teleport_warmup_ms: 5_000,
            challenge_ttl_ms: 60_000,
        }
    }
}

/// Guild-versus-guild battle pacing and rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BattleConfig {
    /// Ready countdown between acceptance and the fight, milliseconds.
    pub ready_ms: u64,

    /// Interval between remaining-time announcements during the
    /// countdown, milliseconds.
    pub announce_every_ms: u64,

    /// Hard cap on fight length, milliseconds.
    pub duration_ms: u64,

    /// Fighters each side must field when the countdown ends, or the
    /// match aborts.
    pub min_participants: usize,

    /// Delay before re-checking the win condition after a participant
    /// disconnects, milliseconds.
    pub recheck_delay_ms: u64,

    /// Paid into the winning guild's bank.
    pub reward_money: Money,

    /// Experience granted to the winning guild.
    pub reward_exp: i64,

    /// Item tags equipped on every fighter when the fight starts.
    #[serde(default)]
    pub loadout: Vec<String>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            ready_ms: 60_000,
            announce_every_ms: 10_000,
            duration_ms: 300_000,
            min_participants: 1,
            recheck_delay_ms: 1_000,
            reward_money: Money::from_major(500.0),
            reward_exp: 250,
            loadout: vec![],
        }
    }
}

/// One purchasable timed effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuffSettings {
    /// Stable identifier used in commands and on the wire.
    pub key: String,

    /// Name shown to players.
    pub display_name: String,

    /// Host-side effect identifier.
    pub effect_type: String,

    /// Effect duration in seconds.
    pub seconds: i32,

    /// Effect strength, host-interpreted.
    pub amplifier: i32,

    /// Price, paid from the guild bank.
    pub cost: Money,
}
