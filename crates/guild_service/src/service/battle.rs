//! Guild-versus-guild battles.
//!
//! One arena per node: a challenge pairs two guilds, a countdown
//! gathers fighters, then an active phase runs until one side has no
//! one standing or the clock ends it. Timer callbacks carry the match
//! id they were armed for and re-check it under the lock before acting,
//! so a resolved or aborted match can never be touched by a stale
//! timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use guild_types::{current_timestamp, GuildId, LedgerDirection, PlayerId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GuildError, GuildResult};

use super::GuildService;

/// What the arena on this node is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleStatus {
    Idle,
    Countdown {
        red_name: String,
        blue_name: String,
    },
    Fighting {
        red_name: String,
        blue_name: String,
        red_alive: usize,
        blue_alive: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Red,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Countdown,
    Fighting,
}

#[derive(Debug)]
struct Participant {
    side: Side,
    name: String,
    alive: bool,
}

#[derive(Debug)]
struct Challenge {
    from: GuildId,
    from_name: String,
    issued_at: Instant,
}

#[derive(Debug)]
struct ActiveMatch {
    id: u64,
    red: GuildId,
    red_name: String,
    blue: GuildId,
    blue_name: String,
    phase: Phase,
    /// Unix seconds; set when the active phase begins.
    started_at: i64,
    participants: HashMap<PlayerId, Participant>,
}

impl ActiveMatch {
    fn alive_on(&self, side: Side) -> usize {
        self.participants
            .values()
            .filter(|p| p.side == side && p.alive)
            .count()
    }
}

/// Per-node battle bookkeeping. Challenges are keyed by the defending
/// guild; the arena holds at most one match.
pub(super) struct BattleState {
    next_id: AtomicU64,
    challenges: DashMap<GuildId, Challenge>,
    active: Mutex<Option<ActiveMatch>>,
}

impl BattleState {
    pub(super) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            challenges: DashMap::new(),
            active: Mutex::new(None),
        }
    }
}

enum Outcome {
    Victory(Side),
    Draw,
}

impl GuildService {
    // ========================================================================
    // Challenges
    // ========================================================================

    /// Staff sends a battle challenge to another guild on this node.
    pub async fn challenge_guild(&self, actor: PlayerId, target_name: &str) -> GuildResult<String> {
        let membership = self.require_staff(actor).await?;
        let mine = membership.guild_id;
        let target = self.guild_by_name(target_name).await?;
        if target.id == mine {
            return Err(GuildError::InvalidInput(
                "you cannot challenge your own guild".into(),
            ));
        }
        if self.battle.active.lock().await.is_some() {
            return Err(GuildError::MatchActive);
        }
        if let Some(existing) = self.battle.challenges.get(&target.id) {
            if existing.issued_at.elapsed() < self.challenge_window() {
                return Err(GuildError::Conflict);
            }
        }

        let my_name = self.guild_name(mine).await?;
        self.battle.challenges.insert(
            target.id,
            Challenge {
                from: mine,
                from_name: my_name.clone(),
                issued_at: Instant::now(),
            },
        );
        self.notify_staff(
            target.id,
            &format!("{my_name} has challenged your guild to a battle!"),
        )
        .await;
        self.notify_guild(mine, &format!("A challenge was sent to {}.", target.name))
            .await;
        info!(from = %mine, to = %target.id, "battle challenge issued");
        Ok(target.name)
    }

    /// Staff declines the challenge waiting on their guild.
    pub async fn decline_challenge(&self, actor: PlayerId) -> GuildResult<String> {
        let membership = self.require_staff(actor).await?;
        let (_, challenge) = self
            .battle
            .challenges
            .remove(&membership.guild_id)
            .ok_or(GuildError::NoMatch)?;
        if challenge.issued_at.elapsed() >= self.challenge_window() {
            return Err(GuildError::NoMatch);
        }
        self.notify_guild(
            challenge.from,
            &format!("{} declined the challenge.", membership.player_name),
        )
        .await;
        Ok(challenge.from_name)
    }

    /// Staff accepts the challenge waiting on their guild and opens the
    /// countdown. The roster is everyone from either guild who is on
    /// this node right now.
    pub async fn accept_challenge(self: &Arc<Self>, actor: PlayerId) -> GuildResult<()> {
        let membership = self.require_staff(actor).await?;
        let blue = membership.guild_id;
        let (_, challenge) = self
            .battle
            .challenges
            .remove(&blue)
            .ok_or(GuildError::NoMatch)?;
        if challenge.issued_at.elapsed() >= self.challenge_window() {
            return Err(GuildError::NoMatch);
        }
        let red = challenge.from;
        // The challenger may have dissolved while the challenge sat.
        let red_name = match self.guild_name(red).await {
            Ok(name) => name,
            Err(_) => return Err(GuildError::StaleState),
        };
        let blue_name = self.guild_name(blue).await?;

        let mut guard = self.battle.active.lock().await;
        if guard.is_some() {
            self.battle.challenges.insert(blue, challenge);
            return Err(GuildError::MatchActive);
        }

        let mut participants = HashMap::new();
        for (guild, side) in [(red, Side::Red), (blue, Side::Blue)] {
            for player in self.cache.members_of(guild) {
                if self.directory.is_online(player).await {
                    let name = self.display_name(player).await;
                    participants.insert(
                        player,
                        Participant {
                            side,
                            name,
                            alive: true,
                        },
                    );
                }
            }
        }
        let min = self.config.battle.min_participants;
        let red_count = participants.values().filter(|p| p.side == Side::Red).count();
        let blue_count = participants.len() - red_count;
        if red_count < min || blue_count < min {
            // A failed accept leaves the challenge claimable until its TTL.
            self.battle.challenges.insert(blue, challenge);
            return Err(GuildError::InvalidInput(
                "too few fighters are online on this node".into(),
            ));
        }

        let id = self.battle.next_id.fetch_add(1, Ordering::Relaxed);
        *guard = Some(ActiveMatch {
            id,
            red,
            red_name: red_name.clone(),
            blue,
            blue_name: blue_name.clone(),
            phase: Phase::Countdown,
            started_at: 0,
            participants,
        });
        drop(guard);

        let ready = Duration::from_millis(self.config.battle.ready_ms);
        let deadline = Instant::now() + ready;
        let service = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ready).await;
            service.begin_active_phase(id).await;
        });

        let announce_every = Duration::from_millis(self.config.battle.announce_every_ms);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(announce_every).await;
                let guard = service.battle.active.lock().await;
                let counting =
                    matches!(&*guard, Some(m) if m.id == id && m.phase == Phase::Countdown);
                drop(guard);
                if !counting {
                    break;
                }
                let remaining = deadline.saturating_duration_since(Instant::now()).as_secs();
                if remaining == 0 {
                    break;
                }
                let line = format!("The battle begins in {remaining}s!");
                service.notify_guild(red, &line).await;
                service.notify_guild(blue, &line).await;
            }
        });

        let line = format!(
            "{red_name} vs {blue_name}! The battle begins in {}s.",
            ready.as_secs()
        );
        self.notify_guild(red, &line).await;
        self.notify_guild(blue, &line).await;
        info!(red = %red, blue = %blue, "battle challenge accepted");
        Ok(())
    }

    // ========================================================================
    // Active phase
    // ========================================================================

    /// End of the countdown. Fighters who went offline are dropped; if
    /// either side fell below the minimum the match dissolves with no
    /// trace, because nothing irreversible has happened yet.
    async fn begin_active_phase(self: &Arc<Self>, id: u64) {
        let mut guard = self.battle.active.lock().await;
        let state = match guard.as_mut() {
            Some(m) if m.id == id && m.phase == Phase::Countdown => m,
            _ => return,
        };

        let roster: Vec<PlayerId> = state.participants.keys().copied().collect();
        for player in roster {
            if !self.directory.is_online(player).await {
                state.participants.remove(&player);
            }
        }

        let min = self.config.battle.min_participants;
        let red_count = state.alive_on(Side::Red);
        let blue_count = state.alive_on(Side::Blue);
        if red_count < min || blue_count < min {
            let taken = guard.take();
            drop(guard);
            if let Some(m) = taken {
                let line = "The battle was called off: too few fighters remained.";
                self.notify_guild(m.red, line).await;
                self.notify_guild(m.blue, line).await;
                info!(red = %m.red, blue = %m.blue, "battle dissolved before start");
            }
            return;
        }

        state.phase = Phase::Fighting;
        state.started_at = current_timestamp();
        let fighters: Vec<PlayerId> = state.participants.keys().copied().collect();
        let (red, blue) = (state.red, state.blue);
        drop(guard);

        let loadout = self.config.battle.loadout.clone();
        for player in &fighters {
            self.vault.capture(*player).await;
            self.host.equip_loadout(*player, &loadout).await;
            self.host.set_battle_mode(*player).await;
        }

        let duration = Duration::from_millis(self.config.battle.duration_ms);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            service.resolve_by_time(id).await;
        });

        let line = "The battle has begun!";
        self.notify_guild(red, line).await;
        self.notify_guild(blue, line).await;
        info!(red = %red, blue = %blue, fighters = fighters.len(), "battle started");
    }

    /// Host callback: a fighter went down. The last side standing wins
    /// on the spot.
    pub async fn participant_down(&self, player: PlayerId) -> GuildResult<()> {
        let mut guard = self.battle.active.lock().await;
        let state = match guard.as_mut() {
            Some(m) if m.phase == Phase::Fighting => m,
            _ => return Err(GuildError::NoMatch),
        };
        let fallen = state
            .participants
            .get_mut(&player)
            .ok_or(GuildError::NotParticipant)?;
        if !fallen.alive {
            // Duplicate death reports are harmless.
            return Ok(());
        }
        fallen.alive = false;
        let name = fallen.name.clone();

        let red_alive = state.alive_on(Side::Red);
        let blue_alive = state.alive_on(Side::Blue);
        let (red, blue) = (state.red, state.blue);
        let (red_name, blue_name) = (state.red_name.clone(), state.blue_name.clone());

        if red_alive == 0 || blue_alive == 0 {
            let taken = guard.take();
            drop(guard);
            if let Some(m) = taken {
                let outcome = match (red_alive, blue_alive) {
                    (0, 0) => Outcome::Draw,
                    (0, _) => Outcome::Victory(Side::Blue),
                    _ => Outcome::Victory(Side::Red),
                };
                self.finalize(m, outcome).await;
            }
            return Ok(());
        }
        drop(guard);

        let line = format!("{name} is out! {red_name} {red_alive} : {blue_alive} {blue_name}");
        self.notify_guild(red, &line).await;
        self.notify_guild(blue, &line).await;
        Ok(())
    }

    /// A disconnect during the countdown just shrinks the roster; one
    /// mid-fight counts as a loss after a short grace, so a burst of
    /// drops resolves once rather than per player.
    pub(crate) async fn handle_battle_disconnect(self: &Arc<Self>, player: PlayerId) {
        let mut guard = self.battle.active.lock().await;
        let state = match guard.as_mut() {
            Some(m) => m,
            None => return,
        };
        match state.phase {
            Phase::Countdown => {
                if state.participants.remove(&player).is_some() {
                    debug!(player = %player, "fighter left during the countdown");
                }
            }
            Phase::Fighting => {
                let id = state.id;
                let fled = match state.participants.get_mut(&player) {
                    Some(p) if p.alive => {
                        p.alive = false;
                        Some((p.name.clone(), state.red, state.blue))
                    }
                    _ => None,
                };
                drop(guard);
                if let Some((name, red, blue)) = fled {
                    let line = format!("{name} has fled the field!");
                    self.notify_guild(red, &line).await;
                    self.notify_guild(blue, &line).await;

                    let delay = Duration::from_millis(self.config.battle.recheck_delay_ms);
                    let service = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        service.evaluate(id).await;
                    });
                }
            }
        }
    }

    /// Victory check run after the disconnect grace.
    async fn evaluate(&self, id: u64) {
        let mut guard = self.battle.active.lock().await;
        let (red_alive, blue_alive) = match guard.as_ref() {
            Some(m) if m.id == id && m.phase == Phase::Fighting => {
                (m.alive_on(Side::Red), m.alive_on(Side::Blue))
            }
            _ => return,
        };
        if red_alive > 0 && blue_alive > 0 {
            return;
        }
        let taken = guard.take();
        drop(guard);
        if let Some(m) = taken {
            let outcome = match (red_alive, blue_alive) {
                (0, 0) => Outcome::Draw,
                (0, _) => Outcome::Victory(Side::Blue),
                _ => Outcome::Victory(Side::Red),
            };
            self.finalize(m, outcome).await;
        }
    }

    /// The clock ran out: more survivors wins, an even count is a draw.
    async fn resolve_by_time(&self, id: u64) {
        let mut guard = self.battle.active.lock().await;
        if !matches!(guard.as_ref(), Some(m) if m.id == id && m.phase == Phase::Fighting) {
            return;
        }
        let m = match guard.take() {
            Some(m) => m,
            None => return,
        };
        drop(guard);

        let red_alive = m.alive_on(Side::Red);
        let blue_alive = m.alive_on(Side::Blue);
        let outcome = if red_alive > blue_alive {
            Outcome::Victory(Side::Red)
        } else if blue_alive > red_alive {
            Outcome::Victory(Side::Blue)
        } else {
            Outcome::Draw
        };
        info!(red = %m.red, blue = %m.blue, red_alive, blue_alive, "battle ran out the clock");
        self.finalize(m, outcome).await;
    }

    /// Operator kills the match. Everything is handed back and nothing
    /// is written to the record.
    pub async fn abort_match(&self, actor_label: &str) -> GuildResult<()> {
        let mut guard = self.battle.active.lock().await;
        let m = guard.take().ok_or(GuildError::NoMatch)?;
        drop(guard);

        if m.phase == Phase::Fighting {
            for player in m.participants.keys() {
                if self.directory.is_online(*player).await {
                    self.vault.restore(*player).await;
                    self.host.restore_mode(*player).await;
                }
            }
        }
        let line = "The battle was called off by an operator.";
        self.notify_guild(m.red, line).await;
        self.notify_guild(m.blue, line).await;
        info!(red = %m.red, blue = %m.blue, actor = actor_label, "battle aborted by operator");
        Ok(())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    async fn finalize(&self, m: ActiveMatch, outcome: Outcome) {
        let end_time = current_timestamp();
        let winner = match outcome {
            Outcome::Victory(Side::Red) => Some(m.red),
            Outcome::Victory(Side::Blue) => Some(m.blue),
            Outcome::Draw => None,
        };

        let (red, blue, started_at) = (m.red, m.blue, m.started_at);
        if let Err(e) = self
            .store
            .run(move |s| s.record_match_result(red, blue, winner, started_at, end_time))
            .await
        {
            warn!(error = %e, "match result write failed");
        }
        if let Some(winner_id) = winner {
            self.award_victory(winner_id).await;
        }

        // Hand back inventories and modes. Offline fighters keep their
        // snapshot and get it on reconnect.
        let red_record = self.store.run(move |s| s.guild_by_id(red)).await.ok().flatten();
        let blue_record = self.store.run(move |s| s.guild_by_id(blue)).await.ok().flatten();
        for (player, participant) in &m.participants {
            if !self.directory.is_online(*player).await {
                continue;
            }
            self.vault.restore(*player).await;
            self.host.restore_mode(*player).await;
            let record = match participant.side {
                Side::Red => red_record.as_ref(),
                Side::Blue => blue_record.as_ref(),
            };
            if let Some(anchor) = record.and_then(|r| r.teleport_location.as_ref()) {
                if anchor.owned_by(&self.node_id) {
                    self.host.relocate(*player, anchor).await;
                }
            }
        }

        let line = match outcome {
            Outcome::Victory(Side::Red) => {
                format!("{} won the battle against {}!", m.red_name, m.blue_name)
            }
            Outcome::Victory(Side::Blue) => {
                format!("{} won the battle against {}!", m.blue_name, m.red_name)
            }
            Outcome::Draw => format!(
                "The battle between {} and {} ended in a draw.",
                m.red_name, m.blue_name
            ),
        };
        self.notify_guild(red, &line).await;
        self.notify_guild(blue, &line).await;
        info!(red = %red, blue = %blue, winner = ?winner, "battle resolved");
    }

    async fn award_victory(&self, winner: GuildId) {
        let money = self.config.battle.reward_money;
        if !money.is_zero() {
            let deposited = self
                .store
                .run(move |s| s.update_balance(winner, money, false))
                .await;
            match deposited {
                Ok(_) => {
                    let logged = self
                        .store
                        .run(move |s| {
                            s.append_ledger(
                                winner,
                                "battle",
                                LedgerDirection::Deposit,
                                money,
                                current_timestamp(),
                            )
                        })
                        .await;
                    if let Err(e) = logged {
                        warn!(guild = %winner, error = %e, "reward ledger write failed");
                    }
                }
                // The winner can disband mid-fight; the prize just lapses.
                Err(e) => warn!(guild = %winner, error = %e, "reward deposit failed"),
            }
        }

        let exp = self.config.battle.reward_exp;
        if exp > 0 {
            let exp_per_level = self.config.limits.exp_per_level;
            let members_per_level = self.config.limits.members_per_level;
            let progress = self
                .store
                .run(move |s| s.add_experience(winner, exp, exp_per_level, members_per_level))
                .await;
            match progress {
                Ok(p) if p.leveled_up() => {
                    self.notify_guild(winner, &format!("The guild has reached level {}!", p.level))
                        .await;
                }
                Ok(_) => {}
                Err(e) => warn!(guild = %winner, error = %e, "reward experience failed"),
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn battle_status(&self) -> BattleStatus {
        match &*self.battle.active.lock().await {
            None => BattleStatus::Idle,
            Some(m) if m.phase == Phase::Countdown => BattleStatus::Countdown {
                red_name: m.red_name.clone(),
                blue_name: m.blue_name.clone(),
            },
            Some(m) => BattleStatus::Fighting {
                red_name: m.red_name.clone(),
                blue_name: m.blue_name.clone(),
                red_alive: m.alive_on(Side::Red),
                blue_alive: m.alive_on(Side::Blue),
            },
        }
    }

    pub(crate) async fn battle_involves(&self, guild: GuildId) -> bool {
        matches!(
            &*self.battle.active.lock().await,
            Some(m) if m.red == guild || m.blue == guild
        )
    }

    fn challenge_window(&self) -> Duration {
        Duration::from_millis(self.config.timing.challenge_ttl_ms)
    }
}
