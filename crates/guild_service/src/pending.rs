//! Staged confirmations for destructive actions.
//!
//! Disbanding a guild or handing over ownership is a two-step flow: the
//! first call stages a [`PendingKind`] keyed by the acting player, the
//! confirmation call consumes it within the time-to-live window. One
//! pending action per player; staging again replaces the old one and
//! disarms its expiry timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use guild_types::{GuildId, PlayerId};

use crate::timer::TimerHandle;

/// The staged action awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingKind {
    /// Delete the guild and scatter its members.
    Disband { guild: GuildId },
    /// Hand ownership to another member.
    Transfer {
        guild: GuildId,
        heir: PlayerId,
        heir_name: String,
    },
}

struct PendingEntry {
    kind: PendingKind,
    expires_at: Instant,
    /// Identity of this staging; the expiry timer only removes the
    /// entry it was armed for, never a newer one under the same key.
    stamp: u64,
    timer: TimerHandle,
}

/// All staged confirmations on this node.
pub struct PendingActions {
    entries: Arc<DashMap<PlayerId, PendingEntry>>,
    next_stamp: AtomicU64,
}

impl Default for PendingActions {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_stamp: AtomicU64::new(1),
        }
    }
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `kind` for `player`, replacing any prior staged action.
    pub fn stage(&self, player: PlayerId, kind: PendingKind, ttl: Duration) {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        let entries = Arc::clone(&self.entries);
        let timer = TimerHandle::run_after(ttl, async move {
            entries.remove_if(&player, |_, entry| entry.stamp == stamp);
        });

        let replaced = self.entries.insert(
            player,
            PendingEntry {
                kind,
                expires_at: Instant::now() + ttl,
                stamp,
                timer,
            },
        );
        if let Some(old) = replaced {
            old.timer.abort();
        }
    }

    /// Consumes the player's staged action. Absent or expired entries
    /// read as `None`: nothing to confirm.
    pub fn take(&self, player: PlayerId) -> Option<PendingKind> {
        let (_, entry) = self.entries.remove(&player)?;
        entry.timer.abort();
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.kind)
    }

    /// Drops the player's staged action without confirming it. Returns
    /// whether anything was staged.
    pub fn cancel(&self, player: PlayerId) -> bool {
        match self.entries.remove(&player) {
            Some((_, entry)) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }
}
