//! The orchestration layer for every player-facing guild operation.
//!
//! Each operation follows the same pipeline: cheap cache pre-checks,
//! authoritative reads and transactional writes through the blocking
//! store facade, economy calls awaited on the async context, then cache
//! updates and notifications (local fan-out plus cluster publish). A
//! failure after a withdrawal always refunds before the error
//! surfaces.

mod bank;
mod battle;
mod bus;
mod info;
mod membership;
mod profile;
mod travel;

pub use bank::BankAdminOp;
pub use battle::BattleStatus;
pub use info::GuildOverview;
pub use membership::InviteOutcome;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use guild_store::{GuildStore, LevelProgress, MemberRecord};
use guild_types::{GuildId, GuildRole, Money, PlayerId};
use guild_wire::BusMessage;
use tracing::{debug, info, warn};

use crate::cache::NodeCache;
use crate::config::GuildConfig;
use crate::error::{GuildError, GuildResult};
use crate::hooks::{
    BattleHost, BusPublisher, Collaborators, Economy, InventoryVault, PlayerDirectory,
};
use crate::pending::{PendingActions, PendingKind};
use crate::store_handle::StoreHandle;
use crate::timer::TimerHandle;

use battle::BattleState;

/// One node's guild service. Constructed once at bootstrap and shared
/// as an `Arc`; holds no ambient statics.
pub struct GuildService {
    node_id: String,
    config: GuildConfig,
    store: StoreHandle,
    cache: NodeCache,
    pending: PendingActions,
    teleports: DashMap<PlayerId, TimerHandle>,
    battle: BattleState,
    economy: Arc<dyn Economy>,
    directory: Arc<dyn PlayerDirectory>,
    vault: Arc<dyn InventoryVault>,
    host: Arc<dyn BattleHost>,
    bus: Arc<dyn BusPublisher>,
}

impl GuildService {
    pub fn new(
        node_id: impl Into<String>,
        config: GuildConfig,
        store: Arc<GuildStore>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let node_id = node_id.into();
        info!(node = %node_id, "guild service starting");
        Arc::new(Self {
            node_id,
            config,
            store: StoreHandle::new(store),
            cache: NodeCache::new(),
            pending: PendingActions::new(),
            teleports: DashMap::new(),
            battle: BattleState::new(),
            economy: collaborators.economy,
            directory: collaborators.directory,
            vault: collaborators.vault,
            host: collaborators.host,
            bus: collaborators.bus,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &GuildConfig {
        &self.config
    }

    /// Read-only view of the node cache, for the host's fast checks.
    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    // ========================================================================
    // Presence hooks
    // ========================================================================

    /// Called by the host when a player connects to this node.
    ///
    /// Fills the cache lazily off the hot path and force-restores any
    /// inventory snapshot left over from an interrupted battle, so a
    /// crash mid-match can never duplicate a loadout.
    pub async fn on_player_connect(self: &Arc<Self>, player: PlayerId, name: &str) {
        debug!(player = %player, name, "player connected");

        if self.vault.has_snapshot(player).await {
            self.vault.restore(player).await;
            self.host.restore_mode(player).await;
            self.notify_player(player, "Your belongings from an unfinished battle were returned.")
                .await;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let lookup = service
                .store
                .run(move |s| s.guild_id_by_player(player))
                .await;
            match lookup {
                Ok(Some(guild)) => {
                    service.cache.set(player, guild);
                    service.show_announcement(player, guild).await;
                }
                Ok(None) => {}
                Err(e) => warn!(player = %player, error = %e, "cache fill failed"),
            }
        });
    }

    async fn show_announcement(&self, player: PlayerId, guild: GuildId) {
        if let Ok(Some(record)) = self.store.run(move |s| s.guild_by_id(guild)).await {
            if !record.announcement.is_empty() {
                self.notify_player(player, &format!("[{}] {}", record.name, record.announcement))
                    .await;
            }
        }
    }

    /// Called by the host when a player disconnects from this node.
    pub async fn on_player_disconnect(self: &Arc<Self>, player: PlayerId) {
        debug!(player = %player, "player disconnected");
        self.cache.forget(player);
        if let Some((_, timer)) = self.teleports.remove(&player) {
            timer.abort();
        }
        self.handle_battle_disconnect(player).await;
    }

    // ========================================================================
    // Progression
    // ========================================================================

    /// Host-side reward hook: grants experience to a guild, for quest
    /// and event payouts. Level-ups raise the member cap; members on
    /// this node hear about them.
    pub async fn grant_experience(
        &self,
        guild: GuildId,
        amount: i64,
    ) -> GuildResult<LevelProgress> {
        if amount <= 0 {
            return Err(GuildError::InvalidInput(
                "experience grants must be positive".into(),
            ));
        }
        let exp_per_level = self.config.limits.exp_per_level;
        let members_per_level = self.config.limits.members_per_level;
        let progress = self
            .store
            .run(move |s| s.add_experience(guild, amount, exp_per_level, members_per_level))
            .await?;
        if progress.leveled_up() {
            self.notify_guild(guild, &format!("The guild has reached level {}!", progress.level))
                .await;
        }
        Ok(progress)
    }

    // ========================================================================
    // Staged confirmations
    // ========================================================================

    /// Confirms the caller's staged destructive action, consuming it.
    /// Returns which action ran so the host can phrase the reply.
    pub async fn confirm(&self, player: PlayerId) -> GuildResult<PendingKind> {
        let kind = self
            .pending
            .take(player)
            .ok_or(GuildError::NoPendingAction)?;
        match &kind {
            PendingKind::Disband { guild } => self.disband_now(player, *guild).await?,
            PendingKind::Transfer {
                guild,
                heir,
                heir_name,
            } => {
                self.transfer_now(player, *guild, *heir, heir_name.clone())
                    .await?
            }
        }
        Ok(kind)
    }

    async fn disband_now(&self, actor: PlayerId, guild: GuildId) -> GuildResult<()> {
        // The staged window is long enough for the world to move on;
        // re-read the role before anything irreversible.
        let membership = self.require_membership(actor).await?;
        if membership.guild_id != guild || membership.role != GuildRole::Owner {
            return Err(GuildError::StaleState);
        }
        let name = self.guild_name(guild).await?;

        self.store.run(move |s| s.delete_guild(guild)).await?;

        let affected = self.cache.clear_guild(guild);
        self.directory
            .broadcast(&affected, &format!("{name} has been disbanded."))
            .await;
        self.publish(BusMessage::DeleteSync { guild }).await;
        info!(guild = %guild, actor = %actor, "guild disbanded");
        Ok(())
    }

    async fn transfer_now(
        &self,
        actor: PlayerId,
        guild: GuildId,
        heir: PlayerId,
        heir_name: String,
    ) -> GuildResult<()> {
        let outcome = self
            .store
            .run({
                let heir_name = heir_name.clone();
                move |s| s.transfer_ownership(guild, actor, heir, &heir_name)
            })
            .await;
        match outcome {
            Ok(()) => {}
            // The heir left or roles shifted inside the window.
            Err(GuildError::NotFound) => return Err(GuildError::StaleState),
            Err(e) => return Err(e),
        }

        self.notify_guild(guild, &format!("Ownership has passed to {heir_name}."))
            .await;
        info!(guild = %guild, heir = %heir, "ownership transferred");
        Ok(())
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    pub(crate) fn confirm_window(&self) -> Duration {
        Duration::from_millis(self.config.timing.confirm_ttl_ms)
    }

    pub(crate) fn invite_window(&self) -> Duration {
        Duration::from_millis(self.config.timing.invite_ttl_ms)
    }

    /// Authoritative membership read; the cache is never trusted here.
    pub(crate) async fn require_membership(&self, player: PlayerId) -> GuildResult<MemberRecord> {
        self.store
            .run(move |s| s.membership_of(player))
            .await?
            .ok_or(GuildError::NotInGuild)
    }

    pub(crate) async fn require_staff(&self, player: PlayerId) -> GuildResult<MemberRecord> {
        let membership = self.require_membership(player).await?;
        if !membership.role.is_staff() {
            return Err(GuildError::PermissionDenied);
        }
        Ok(membership)
    }

    pub(crate) async fn require_owner(&self, player: PlayerId) -> GuildResult<MemberRecord> {
        let membership = self.require_membership(player).await?;
        if membership.role != GuildRole::Owner {
            return Err(GuildError::PermissionDenied);
        }
        Ok(membership)
    }

    pub(crate) async fn guild_name(&self, guild: GuildId) -> GuildResult<String> {
        Ok(self
            .store
            .run(move |s| s.guild_by_id(guild))
            .await?
            .ok_or(GuildError::NotFound)?
            .name)
    }

    /// Best name available for a player: live session first, then the
    /// stored membership snapshot.
    pub(crate) async fn display_name(&self, player: PlayerId) -> String {
        if let Some(name) = self.directory.resolve_name(player).await {
            return name;
        }
        match self.store.run(move |s| s.membership_of(player)).await {
            Ok(Some(membership)) => membership.player_name,
            _ => player.to_string(),
        }
    }

    pub(crate) async fn notify_player(&self, player: PlayerId, text: &str) {
        self.directory.send_message(player, text).await;
    }

    /// One line to every member of `guild` connected to this node.
    pub(crate) async fn notify_guild(&self, guild: GuildId, text: &str) {
        let members = self.cache.members_of(guild);
        if !members.is_empty() {
            self.directory.broadcast(&members, text).await;
        }
    }

    /// One line to every OWNER or ADMIN of `guild` connected to this
    /// node. Roles come from the store; the cache only narrows the
    /// candidate set.
    pub(crate) async fn notify_staff(&self, guild: GuildId, text: &str) {
        let candidates = self.cache.members_of(guild);
        if candidates.is_empty() {
            return;
        }
        let mut staff = Vec::new();
        for player in candidates {
            match self.store.run(move |s| s.is_staff(guild, player)).await {
                Ok(true) => staff.push(player),
                Ok(false) => {}
                Err(e) => warn!(guild = %guild, error = %e, "staff lookup failed"),
            }
        }
        if !staff.is_empty() {
            self.directory.broadcast(&staff, text).await;
        }
    }

    pub(crate) async fn publish(&self, message: BusMessage) {
        self.bus.publish(message).await;
    }

    /// Updates the local cache and tells the cluster. `None` clears.
    pub(crate) async fn sync_membership(&self, player: PlayerId, guild: Option<GuildId>) {
        match guild {
            Some(id) => {
                // Only track players this node is responsible for.
                if self.directory.is_online(player).await || self.cache.contains(player) {
                    self.cache.set(player, id);
                }
            }
            None => self.cache.clear(player),
        }
        self.publish(BusMessage::SyncCache { player, guild }).await;
    }

    /// Compensating deposit after a failed post-withdrawal step. A
    /// refund that itself fails is logged loudly; money must never
    /// vanish silently.
    pub(crate) async fn refund(&self, player: PlayerId, amount: Money) {
        if !self.economy.deposit(player, amount).await {
            warn!(player = %player, %amount, "compensating refund failed");
        }
    }
}
