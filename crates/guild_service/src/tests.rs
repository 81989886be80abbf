//! Service-level tests with scripted host collaborators.
//!
//! Every test drives the real service against an in-memory store; the
//! wallet, player directory, vault, battle host and bus are recording
//! fakes. Timer-driven paths use short windows and generous sleeps.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use guild_store::GuildStore;
use guild_types::{GuildRole, Money, NodeLocation, PlayerId};
use guild_wire::BusMessage;

use crate::config::{BuffSettings, GuildConfig};
use crate::error::GuildError;
use crate::hooks::{
    BattleHost, BusPublisher, Collaborators, Economy, InventoryVault, PlayerDirectory,
};
use crate::service::{BankAdminOp, BattleStatus, GuildService, InviteOutcome};

// ============================================================================
// Scripted collaborators
// ============================================================================

#[derive(Default)]
struct TestEconomy {
    balances: Mutex<HashMap<PlayerId, Money>>,
    fail_deposits: AtomicBool,
}

impl TestEconomy {
    fn grant(&self, player: PlayerId, amount: Money) {
        let mut balances = self.balances.lock().unwrap();
        let current = balances.entry(player).or_insert(Money::ZERO);
        *current = current.saturating_add(amount);
    }

    fn balance(&self, player: PlayerId) -> Money {
        *self
            .balances
            .lock()
            .unwrap()
            .get(&player)
            .unwrap_or(&Money::ZERO)
    }

    fn refuse_deposits(&self) {
        self.fail_deposits.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Economy for TestEconomy {
    async fn has(&self, player: PlayerId, amount: Money) -> bool {
        self.balance(player) >= amount
    }

    async fn withdraw(&self, player: PlayerId, amount: Money) -> bool {
        let mut balances = self.balances.lock().unwrap();
        let current = balances.entry(player).or_insert(Money::ZERO);
        if *current < amount {
            return false;
        }
        *current = current.saturating_sub(amount);
        true
    }

    async fn deposit(&self, player: PlayerId, amount: Money) -> bool {
        if self.fail_deposits.load(Ordering::SeqCst) {
            return false;
        }
        let mut balances = self.balances.lock().unwrap();
        let current = balances.entry(player).or_insert(Money::ZERO);
        *current = current.saturating_add(amount);
        true
    }
}

#[derive(Default)]
struct TestDirectory {
    names: Mutex<HashMap<PlayerId, String>>,
    online: Mutex<HashSet<PlayerId>>,
    messages: Mutex<Vec<(PlayerId, String)>>,
}

impl TestDirectory {
    fn join(&self, player: PlayerId, name: &str) {
        self.names.lock().unwrap().insert(player, name.to_string());
        self.online.lock().unwrap().insert(player);
    }

    fn part(&self, player: PlayerId) {
        self.online.lock().unwrap().remove(&player);
    }

    fn messages_for(&self, player: PlayerId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn saw(&self, player: PlayerId, fragment: &str) -> bool {
        self.messages_for(player).iter().any(|m| m.contains(fragment))
    }
}

#[async_trait]
impl PlayerDirectory for TestDirectory {
    async fn resolve_id(&self, name: &str) -> Option<PlayerId> {
        let names = self.names.lock().unwrap();
        let online = self.online.lock().unwrap();
        names
            .iter()
            .find(|(id, n)| n.eq_ignore_ascii_case(name) && online.contains(id))
            .map(|(id, _)| *id)
    }

    async fn resolve_name(&self, player: PlayerId) -> Option<String> {
        self.names.lock().unwrap().get(&player).cloned()
    }

    async fn is_online(&self, player: PlayerId) -> bool {
        self.online.lock().unwrap().contains(&player)
    }

    async fn send_message(&self, player: PlayerId, text: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((player, text.to_string()));
    }

    async fn broadcast(&self, players: &[PlayerId], text: &str) {
        let mut messages = self.messages.lock().unwrap();
        for player in players {
            messages.push((*player, text.to_string()));
        }
    }
}

#[derive(Default)]
struct TestVault {
    snapshots: Mutex<HashSet<PlayerId>>,
}

impl TestVault {
    fn prime(&self, player: PlayerId) {
        self.snapshots.lock().unwrap().insert(player);
    }

    fn holds(&self, player: PlayerId) -> bool {
        self.snapshots.lock().unwrap().contains(&player)
    }
}

#[async_trait]
impl InventoryVault for TestVault {
    async fn capture(&self, player: PlayerId) {
        self.snapshots.lock().unwrap().insert(player);
    }

    async fn restore(&self, player: PlayerId) {
        self.snapshots.lock().unwrap().remove(&player);
    }

    async fn has_snapshot(&self, player: PlayerId) -> bool {
        self.holds(player)
    }
}

#[derive(Default)]
struct TestHost {
    equips: Mutex<Vec<PlayerId>>,
    battle_modes: Mutex<Vec<PlayerId>>,
    mode_restores: Mutex<Vec<PlayerId>>,
    relocations: Mutex<Vec<(PlayerId, NodeLocation)>>,
    effects: Mutex<Vec<(PlayerId, String, i32, i32)>>,
}

#[async_trait]
impl BattleHost for TestHost {
    async fn equip_loadout(&self, player: PlayerId, _items: &[String]) {
        self.equips.lock().unwrap().push(player);
    }

    async fn set_battle_mode(&self, player: PlayerId) {
        self.battle_modes.lock().unwrap().push(player);
    }

    async fn restore_mode(&self, player: PlayerId) {
        self.mode_restores.lock().unwrap().push(player);
    }

    async fn relocate(&self, player: PlayerId, location: &NodeLocation) {
        self.relocations
            .lock()
            .unwrap()
            .push((player, location.clone()));
    }

    async fn apply_effect(
        &self,
        player: PlayerId,
        effect_type: &str,
        seconds: i32,
        amplifier: i32,
    ) {
        self.effects
            .lock()
            .unwrap()
            .push((player, effect_type.to_string(), seconds, amplifier));
    }
}

#[derive(Default)]
struct RecordingBus {
    sent: Mutex<Vec<BusMessage>>,
}

impl RecordingBus {
    fn sent(&self) -> Vec<BusMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusPublisher for RecordingBus {
    async fn publish(&self, message: BusMessage) {
        self.sent.lock().unwrap().push(message);
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    service: Arc<GuildService>,
    economy: Arc<TestEconomy>,
    directory: Arc<TestDirectory>,
    vault: Arc<TestVault>,
    host: Arc<TestHost>,
    bus: Arc<RecordingBus>,
}

fn test_config() -> GuildConfig {
    let mut config = GuildConfig::default();
    config.timing.invite_ttl_ms = 120;
    config.timing.confirm_ttl_ms = 120;
    config.timing.teleport_warmup_ms = 40;
    config.timing.challenge_ttl_ms = 500;
    config.battle.ready_ms = 80;
    config.battle.announce_every_ms = 30;
    config.battle.duration_ms = 5_000;
    config.battle.recheck_delay_ms = 40;
    config.buffs = vec![BuffSettings {
        key: "haste".to_string(),
        display_name: "Hunter's Pace".to_string(),
        effect_type: "speed".to_string(),
        seconds: 90,
        amplifier: 1,
        cost: Money::from_major(250.0),
    }];
    config
}

fn harness() -> Harness {
    let economy = Arc::new(TestEconomy::default());
    let directory = Arc::new(TestDirectory::default());
    let vault = Arc::new(TestVault::default());
    let host = Arc::new(TestHost::default());
    let bus = Arc::new(RecordingBus::default());
    let store = Arc::new(GuildStore::open_in_memory().unwrap());

    let service = GuildService::new(
        "alpha",
        test_config(),
        store,
        Collaborators {
            economy: economy.clone(),
            directory: directory.clone(),
            vault: vault.clone(),
            host: host.clone(),
            bus: bus.clone(),
        },
    );
    Harness {
        service,
        economy,
        directory,
        vault,
        host,
        bus,
    }
}

async fn connect(h: &Harness, name: &str) -> PlayerId {
    let player = PlayerId::new();
    h.directory.join(player, name);
    h.service.on_player_connect(player, name).await;
    player
}

/// Connects a funded founder and creates their guild.
async fn found(h: &Harness, player_name: &str, guild_name: &str) -> (PlayerId, guild_types::GuildId) {
    let player = connect(h, player_name).await;
    h.economy.grant(player, Money::from_major(20_000.0));
    let record = h.service.create_guild(player, guild_name).await.unwrap();
    (player, record.id)
}

/// Applies and is accepted, via the real request pipeline.
async fn admit(h: &Harness, owner: PlayerId, guild_name: &str, player_name: &str) -> PlayerId {
    let player = connect(h, player_name).await;
    h.service.request_join(player, guild_name).await.unwrap();
    h.service.accept_request(owner, player_name).await.unwrap();
    player
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Founding and money
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn founding_charges_the_fee_and_seeds_the_cache() {
    let h = harness();
    let ada = connect(&h, "Ada").await;
    h.economy.grant(ada, Money::from_major(15_000.0));

    let record = h.service.create_guild(ada, "Wolves").await.unwrap();

    assert_eq!(record.name, "Wolves");
    assert_eq!(record.level, 1);
    assert_eq!(record.balance, Money::ZERO);
    assert_eq!(h.economy.balance(ada), Money::from_major(5_000.0));
    assert_eq!(h.service.cache().get(ada), Some(record.id));

    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.members.len(), 1);
    assert_eq!(overview.members[0].role, GuildRole::Owner);

    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::SyncCache { player, guild: Some(g) } if *player == ada && *g == record.id
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn founding_without_funds_charges_nothing() {
    let h = harness();
    let ada = connect(&h, "Ada").await;
    h.economy.grant(ada, Money::from_major(9_999.0));

    let err = h.service.create_guild(ada, "Wolves").await.unwrap_err();
    assert!(matches!(err, GuildError::InsufficientFunds { .. }));
    assert_eq!(h.economy.balance(ada), Money::from_major(9_999.0));
    assert!(h.service.overview_of("Wolves").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_refunds_the_fee_on_a_name_conflict() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    found(&h, "Bea", "Ravens").await;
    let before = h.economy.balance(ada);

    let err = h.service.rename(ada, "ravens").await.unwrap_err();
    assert!(matches!(err, GuildError::Conflict));
    assert_eq!(h.economy.balance(ada), before);

    h.service.rename(ada, "Direwolves").await.unwrap();
    assert_eq!(
        h.economy.balance(ada),
        before.saturating_sub(Money::from_major(1_000.0))
    );
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::RenameSync { new_name, .. } if new_name == "Direwolves"
    )));
}

// ============================================================================
// Applications and invitations
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn application_flow_admits_the_applicant() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let bea = connect(&h, "Bea").await;

    h.service.request_join(bea, "Wolves").await.unwrap();
    assert!(h.directory.saw(ada, "applied to join Wolves"));
    assert!(h.bus.sent().iter().any(|m| matches!(m, BusMessage::NotifyRequest { .. })));

    let member = h.service.accept_request(ada, "Bea").await.unwrap();
    assert_eq!(member.role, GuildRole::Member);
    assert_eq!(h.service.cache().get(bea), Some(wolves));
    assert!(h.service.pending_requests(ada).await.unwrap().is_empty());
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::MemberJoin { player_name, .. } if player_name == "Bea"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_applications_are_rejected() {
    let h = harness();
    found(&h, "Ada", "Wolves").await;
    let bea = connect(&h, "Bea").await;

    h.service.request_join(bea, "Wolves").await.unwrap();
    let err = h.service.request_join(bea, "Wolves").await.unwrap_err();
    assert!(matches!(err, GuildError::Conflict));
}

#[tokio::test(flavor = "multi_thread")]
async fn accepting_an_absent_applicant_reports_not_found() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = connect(&h, "Bea").await;

    h.service.request_join(bea, "Wolves").await.unwrap();
    h.service.cancel_request(bea, "Wolves").await.unwrap();

    let err = h.service.accept_request(ada, "Bea").await.unwrap_err();
    assert!(matches!(err, GuildError::NotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_invites_are_delivered_and_claimable() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let bea = connect(&h, "Bea").await;

    let outcome = h.service.invite(ada, "Bea").await.unwrap();
    assert_eq!(outcome, InviteOutcome::Delivered);
    assert!(h.directory.saw(bea, "invited you to join Wolves"));

    let member = h.service.accept_invite(bea).await.unwrap();
    assert_eq!(member.guild_id, wolves);
    assert_eq!(h.service.cache().get(bea), Some(wolves));
}

#[tokio::test(flavor = "multi_thread")]
async fn invites_expire() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = connect(&h, "Bea").await;

    h.service.invite(ada, "Bea").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = h.service.accept_invite(bea).await.unwrap_err();
    assert!(matches!(err, GuildError::NoPendingAction));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_targets_forward_across_the_cluster() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;

    let outcome = h.service.invite(ada, "Rem").await.unwrap();
    assert_eq!(outcome, InviteOutcome::Forwarded);
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::CrossInvite { target_name, guild, .. }
            if target_name == "Rem" && *guild == wolves
    )));
}

// ============================================================================
// Kicks, leaves, roles
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn kick_honours_the_role_ladder() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;
    let cal = admit(&h, ada, "Wolves", "Cal").await;
    admit(&h, ada, "Wolves", "Dee").await;
    h.service.set_role(ada, "Bea", GuildRole::Admin).await.unwrap();
    h.service.set_role(ada, "Dee", GuildRole::Admin).await.unwrap();

    // Admins reach plain members only.
    h.service.kick(bea, "Cal").await.unwrap();
    assert_eq!(h.service.cache().get(cal), None);
    assert!(matches!(
        h.service.kick(bea, "Ada").await.unwrap_err(),
        GuildError::PermissionDenied
    ));
    assert!(matches!(
        h.service.kick(bea, "Dee").await.unwrap_err(),
        GuildError::PermissionDenied
    ));

    // The owner reaches everyone but themselves.
    assert!(matches!(
        h.service.kick(ada, "Ada").await.unwrap_err(),
        GuildError::InvalidInput(_)
    ));
    h.service.kick(ada, "Dee").await.unwrap();

    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::MemberKick { player_name, .. } if player_name == "Cal"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn owners_cannot_leave_their_guild() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;

    assert!(matches!(
        h.service.leave(ada).await.unwrap_err(),
        GuildError::PermissionDenied
    ));

    let name = h.service.leave(bea).await.unwrap();
    assert_eq!(name, "Wolves");
    assert_eq!(h.service.cache().get(bea), None);
    assert_eq!(h.service.my_guild(ada).await.unwrap().members.len(), 1);
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::MemberLeave { guild, player_name } if *guild == wolves && player_name == "Bea"
    )));
}

// ============================================================================
// Staged confirmations
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn disband_confirmation_expires() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;

    h.service.request_disband(ada).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let err = h.service.confirm(ada).await.unwrap_err();
    assert!(matches!(err, GuildError::NoPendingAction));
    assert!(h.service.overview_of("Wolves").await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn disband_confirm_deletes_and_broadcasts() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;

    h.service.request_disband(ada).await.unwrap();
    h.service.confirm(ada).await.unwrap();

    assert!(h.service.overview_of("Wolves").await.is_err());
    assert_eq!(h.service.cache().get(ada), None);
    assert_eq!(h.service.cache().get(bea), None);
    assert!(h.directory.saw(bea, "disbanded"));
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::DeleteSync { guild } if *guild == wolves
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_confirm_revalidates_the_heir() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;

    h.service.request_transfer(ada, "Bea").await.unwrap();
    h.service.leave(bea).await.unwrap();

    let err = h.service.confirm(ada).await.unwrap_err();
    assert!(matches!(err, GuildError::StaleState));
    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.record.owner_name, "Ada");
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_hands_over_exactly_one_owner_role() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;

    h.service.request_transfer(ada, "Bea").await.unwrap();
    h.service.confirm(ada).await.unwrap();

    let overview = h.service.my_guild(bea).await.unwrap();
    assert_eq!(overview.record.owner_name, "Bea");
    let roles: HashMap<_, _> = overview
        .members
        .iter()
        .map(|m| (m.player_name.clone(), m.role))
        .collect();
    assert_eq!(roles["Bea"], GuildRole::Owner);
    assert_eq!(roles["Ada"], GuildRole::Admin);
}

// ============================================================================
// Treasury
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn console_set_applies_a_delta_not_an_absolute() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    h.service
        .deposit(ada, Money::from_major(4_000.0))
        .await
        .unwrap();

    let balance = h
        .service
        .admin_manage_bank("console", "Wolves", BankAdminOp::Set(Money::from_major(1_000.0)))
        .await
        .unwrap();
    assert_eq!(balance, Money::from_major(1_000.0));

    let page = h.service.ledger_page(ada, 0).await.unwrap();
    assert_eq!(page[0].actor_name, "console");
    assert_eq!(page[0].amount, Money::from_major(1_000.0));
    assert_eq!(page[0].direction, guild_types::LedgerDirection::Withdraw);
    assert_eq!(page[1].actor_name, "Ada");
    assert_eq!(page[1].amount, Money::from_major(4_000.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn withdrawals_are_staff_only_and_cover_checked() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let bea = admit(&h, ada, "Wolves", "Bea").await;
    h.service
        .deposit(ada, Money::from_major(300.0))
        .await
        .unwrap();

    assert!(matches!(
        h.service.withdraw(bea, Money::from_major(100.0)).await.unwrap_err(),
        GuildError::PermissionDenied
    ));
    assert!(matches!(
        h.service.withdraw(ada, Money::from_major(400.0)).await.unwrap_err(),
        GuildError::InsufficientFunds { required } if required == Money::from_major(400.0)
    ));

    let wallet_before = h.economy.balance(ada);
    let balance = h.service.withdraw(ada, Money::from_major(120.0)).await.unwrap();
    assert_eq!(balance, Money::from_major(180.0));
    assert_eq!(
        h.economy.balance(ada),
        wallet_before.saturating_add(Money::from_major(120.0))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn withdraw_rolls_back_when_the_payout_fails() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    h.service
        .deposit(ada, Money::from_major(500.0))
        .await
        .unwrap();

    h.economy.refuse_deposits();
    let err = h.service.withdraw(ada, Money::from_major(200.0)).await.unwrap_err();
    assert!(matches!(err, GuildError::Internal(_)));

    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.record.balance, Money::from_major(500.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn buff_purchase_charges_the_treasury_and_applies_effects() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    h.service
        .deposit(ada, Money::from_major(1_000.0))
        .await
        .unwrap();

    assert!(matches!(
        h.service.buy_buff(ada, "bogus").await.unwrap_err(),
        GuildError::UnknownBuff(_)
    ));

    let name = h.service.buy_buff(ada, "haste").await.unwrap();
    assert_eq!(name, "Hunter's Pace");

    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.record.balance, Money::from_major(750.0));
    assert!(h
        .host
        .effects
        .lock()
        .unwrap()
        .iter()
        .any(|(p, e, s, a)| *p == ada && e == "speed" && *s == 90 && *a == 1));
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::BuffSync { buff_name, .. } if buff_name == "Hunter's Pace"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn experience_grants_level_up_and_grow_the_cap() {
    let h = harness();
    let (ada, guild) = found(&h, "Ada", "Wolves").await;
    let base_cap = h.service.my_guild(ada).await.unwrap().record.max_members;

    assert!(matches!(
        h.service.grant_experience(guild, 0).await.unwrap_err(),
        GuildError::InvalidInput(_)
    ));

    // Level 1 needs exp_per_level * 1; overshoot carries into level 2.
    let threshold = h.service.config().limits.exp_per_level;
    let progress = h.service.grant_experience(guild, threshold + 40).await.unwrap();
    assert_eq!(progress.level, 2);
    assert_eq!(progress.exp, 40);
    assert!(progress.leveled_up());

    let record = h.service.my_guild(ada).await.unwrap().record;
    assert_eq!(record.level, 2);
    assert_eq!(
        record.max_members,
        base_cap + h.service.config().limits.members_per_level
    );
    assert!(h.directory.saw(ada, "reached level 2"));
}

// ============================================================================
// Teleports
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn teleport_completes_after_the_warmup() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let anchor = NodeLocation::new("alpha", 10.0, 64.0, -3.5);
    h.service.set_teleport_anchor(ada, anchor.clone()).await.unwrap();
    let wallet_before = h.economy.balance(ada);

    let warmup = h.service.teleport(ada).await.unwrap();
    assert_eq!(warmup, 40);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let relocations = h.host.relocations.lock().unwrap().clone();
    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].0, ada);
    assert_eq!(relocations[0].1, anchor);
    // Level 1 pays the base fee.
    assert_eq!(
        h.economy.balance(ada),
        wallet_before.saturating_sub(Money::from_major(100.0))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn teleport_rejects_wrong_node_and_duplicates() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;

    h.service
        .set_teleport_anchor(ada, NodeLocation::new("beta", 0.0, 70.0, 0.0))
        .await
        .unwrap();
    assert!(matches!(
        h.service.teleport(ada).await.unwrap_err(),
        GuildError::WrongNode
    ));

    h.service
        .set_teleport_anchor(ada, NodeLocation::new("alpha", 0.0, 70.0, 0.0))
        .await
        .unwrap();
    h.service.teleport(ada).await.unwrap();
    assert!(matches!(
        h.service.teleport(ada).await.unwrap_err(),
        GuildError::TeleportPending
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_cancels_the_warmup() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    h.service
        .set_teleport_anchor(ada, NodeLocation::new("alpha", 0.0, 70.0, 0.0))
        .await
        .unwrap();

    h.service.teleport(ada).await.unwrap();
    h.service.on_player_disconnect(ada).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(h.host.relocations.lock().unwrap().is_empty());
}

// ============================================================================
// Battles
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn countdown_dissolves_without_enough_fighters() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let (bea, _) = found(&h, "Bea", "Ravens").await;

    h.service.challenge_guild(ada, "Ravens").await.unwrap();
    h.service.accept_challenge(bea).await.unwrap();
    // The whole defending side walks away during the countdown.
    h.directory.part(bea);
    h.service.on_player_disconnect(bea).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.service.battle_status().await, BattleStatus::Idle);
    assert!(h.service.match_history_page(ada, 0).await.unwrap().is_empty());
    assert!(!h.vault.holds(ada));
    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.record.pvp_total, 0);
    assert_eq!(overview.record.balance, Money::ZERO);
}

#[tokio::test(flavor = "multi_thread")]
async fn last_fighter_down_resolves_the_battle() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let (bea, _) = found(&h, "Bea", "Ravens").await;

    h.service.challenge_guild(ada, "Ravens").await.unwrap();
    h.service.accept_challenge(bea).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(matches!(
        h.service.battle_status().await,
        BattleStatus::Fighting { .. }
    ));
    assert!(h.vault.holds(ada) && h.vault.holds(bea));

    h.service.participant_down(bea).await.unwrap();
    settle().await;

    assert_eq!(h.service.battle_status().await, BattleStatus::Idle);
    // The result lands exactly once.
    assert!(matches!(
        h.service.participant_down(bea).await.unwrap_err(),
        GuildError::NoMatch
    ));

    let history = h.service.match_history_page(ada, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].winner_guild_id, Some(wolves));

    let winners = h.service.my_guild(ada).await.unwrap();
    assert_eq!(winners.record.pvp_wins, 1);
    assert_eq!(winners.record.pvp_total, 1);
    assert_eq!(winners.record.balance, Money::from_major(500.0));
    let losers = h.service.my_guild(bea).await.unwrap();
    assert_eq!(losers.record.pvp_losses, 1);
    assert_eq!(losers.record.pvp_total, 1);

    // Everyone got their belongings and game-mode back.
    assert!(!h.vault.holds(ada) && !h.vault.holds(bea));
    let restores = h.host.mode_restores.lock().unwrap().clone();
    assert!(restores.contains(&ada) && restores.contains(&bea));
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_mid_fight_forfeits_after_the_grace() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    let (bea, _) = found(&h, "Bea", "Ravens").await;

    h.service.challenge_guild(ada, "Ravens").await.unwrap();
    h.service.accept_challenge(bea).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        h.service.battle_status().await,
        BattleStatus::Fighting { .. }
    ));

    h.directory.part(bea);
    h.service.on_player_disconnect(bea).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.service.battle_status().await, BattleStatus::Idle);
    let history = h.service.match_history_page(ada, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].winner_guild_id, Some(wolves));

    // The deserter's snapshot waits for their reconnect.
    assert!(h.vault.holds(bea));
    h.directory.join(bea, "Bea");
    h.service.on_player_connect(bea, "Bea").await;
    assert!(!h.vault.holds(bea));
    assert!(h.directory.saw(bea, "belongings"));
}

#[tokio::test(flavor = "multi_thread")]
async fn operator_abort_leaves_no_record() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    let (bea, _) = found(&h, "Bea", "Ravens").await;

    h.service.challenge_guild(ada, "Ravens").await.unwrap();
    h.service.accept_challenge(bea).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    h.service.abort_match("console").await.unwrap();

    assert_eq!(h.service.battle_status().await, BattleStatus::Idle);
    assert!(h.service.match_history_page(ada, 0).await.unwrap().is_empty());
    assert!(!h.vault.holds(ada) && !h.vault.holds(bea));
    let overview = h.service.my_guild(ada).await.unwrap();
    assert_eq!(overview.record.pvp_total, 0);
}

// ============================================================================
// Cluster bus, inbound
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn remote_sync_only_lands_for_known_players() {
    let h = harness();
    let stranger = PlayerId::new();
    let frame = BusMessage::SyncCache {
        player: stranger,
        guild: Some(guild_types::GuildId(9)),
    }
    .encode()
    .unwrap();
    h.service.handle_frame(&frame).await.unwrap();
    assert_eq!(h.service.cache().get(stranger), None);

    let bea = connect(&h, "Bea").await;
    let frame = BusMessage::SyncCache {
        player: bea,
        guild: Some(guild_types::GuildId(9)),
    }
    .encode()
    .unwrap();
    h.service.handle_frame(&frame).await.unwrap();
    assert_eq!(h.service.cache().get(bea), Some(guild_types::GuildId(9)));

    let frame = BusMessage::SyncCache { player: bea, guild: None }.encode().unwrap();
    h.service.handle_frame(&frame).await.unwrap();
    assert_eq!(h.service.cache().get(bea), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_cross_invite_lands_for_local_players() {
    let h = harness();
    let bea = connect(&h, "Bea").await;

    let frame = BusMessage::CrossInvite {
        target_name: "Bea".to_string(),
        guild: guild_types::GuildId(7),
        guild_name: "Wolves".to_string(),
        inviter: "Ada".to_string(),
    }
    .encode()
    .unwrap();
    h.service.handle_frame(&frame).await.unwrap();

    assert!(h.directory.saw(bea, "invited you to join Wolves"));
    let invite = h.service.cache().take_invite(bea).unwrap();
    assert_eq!(invite.guild_name, "Wolves");
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_kick_clears_the_local_cache() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;

    let frame = BusMessage::MemberKick {
        guild: wolves,
        player_name: "Ada".to_string(),
    }
    .encode()
    .unwrap();
    h.service.handle_frame(&frame).await.unwrap();

    assert_eq!(h.service.cache().get(ada), None);
    assert!(h.directory.saw(ada, "removed from your guild"));
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_delete_scatters_local_members() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;

    let frame = BusMessage::DeleteSync { guild: wolves }.encode().unwrap();
    h.service.handle_frame(&frame).await.unwrap();

    assert_eq!(h.service.cache().get(ada), None);
    assert!(h.directory.saw(ada, "disbanded"));
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_chat_reaches_cached_members() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;

    let frame = BusMessage::Chat {
        guild: wolves,
        sender: "Rem".to_string(),
        text: "over here".to_string(),
    }
    .encode()
    .unwrap();
    h.service.handle_frame(&frame).await.unwrap();

    assert!(h.directory.saw(ada, "[Guild] Rem: over here"));
}

// ============================================================================
// Cache behaviour and presence
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn chat_falls_back_to_the_store_on_a_cache_miss() {
    let h = harness();
    let (ada, wolves) = found(&h, "Ada", "Wolves").await;
    h.service.cache().clear(ada);

    h.service.chat(ada, "anyone home?").await.unwrap();

    assert_eq!(h.service.cache().get(ada), Some(wolves));
    assert!(h.bus.sent().iter().any(|m| matches!(
        m,
        BusMessage::Chat { sender, .. } if sender == "Ada"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnect_restores_a_stranded_snapshot() {
    let h = harness();
    let bea = PlayerId::new();
    h.vault.prime(bea);
    h.directory.join(bea, "Bea");

    h.service.on_player_connect(bea, "Bea").await;

    assert!(!h.vault.holds(bea));
    assert!(h.host.mode_restores.lock().unwrap().contains(&bea));
    assert!(h.directory.saw(bea, "belongings"));
}

#[tokio::test(flavor = "multi_thread")]
async fn announcement_greets_members_at_login() {
    let h = harness();
    let (ada, _) = found(&h, "Ada", "Wolves").await;
    h.service
        .set_announcement(ada, "Raid at dawn")
        .await
        .unwrap();

    h.service.on_player_disconnect(ada).await;
    h.directory.join(ada, "Ada");
    h.service.on_player_connect(ada, "Ada").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(h.service.cache().get(ada), Some(h.service.my_guild(ada).await.unwrap().record.id));
    assert!(h.directory.saw(ada, "Raid at dawn"));
}
