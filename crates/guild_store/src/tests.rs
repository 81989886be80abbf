use guild_types::{GuildId, GuildRole, LedgerDirection, Money, NodeLocation, PlayerId};

use crate::{GuildStore, StoreError};

const NOW: i64 = 1_700_000_000;

fn store() -> GuildStore {
    GuildStore::open_in_memory().unwrap()
}

fn found(store: &GuildStore, name: &str, owner: PlayerId, max_members: i32) -> GuildId {
    store
        .create_guild(name, owner, "Owner", max_members, NOW)
        .unwrap()
        .id
}

#[test]
fn create_guild_inserts_guild_and_owner_together() {
    let store = store();
    let owner = PlayerId::new();
    let record = store
        .create_guild("Wolves", owner, "Ada", 10, NOW)
        .unwrap();

    let read_back = store.guild_by_id(record.id).unwrap().unwrap();
    assert_eq!(read_back.name, "Wolves");
    assert_eq!(read_back.owner_id, owner);
    assert_eq!(read_back.level, 1);
    assert_eq!(read_back.balance, Money::ZERO);

    let membership = store.membership_of(owner).unwrap().unwrap();
    assert_eq!(membership.guild_id, record.id);
    assert_eq!(membership.role, GuildRole::Owner);
    assert_eq!(store.member_count(record.id).unwrap(), 1);
}

#[test]
fn guild_names_are_unique_case_insensitively() {
    let store = store();
    found(&store, "Wolves", PlayerId::new(), 10);

    let err = store
        .create_guild("WOLVES", PlayerId::new(), "Bea", 10, NOW)
        .unwrap_err();
    assert!(matches!(err, StoreError::NameConflict));
    assert!(store.guild_name_taken("wolves").unwrap());
}

#[test]
fn a_player_founds_at_most_one_guild() {
    let store = store();
    let owner = PlayerId::new();
    found(&store, "Wolves", owner, 10);

    let err = store
        .create_guild("Bears", owner, "Ada", 10, NOW)
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyInGuild));
    // The failed create left no orphan guild row behind.
    assert!(store.guild_by_name("Bears").unwrap().is_none());
}

#[test]
fn member_cap_is_enforced_at_admission() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 2);

    store.add_member(guild, PlayerId::new(), "Bea", NOW).unwrap();
    let err = store
        .add_member(guild, PlayerId::new(), "Cal", NOW)
        .unwrap_err();
    assert!(matches!(err, StoreError::MemberLimit));
    assert_eq!(store.member_count(guild).unwrap(), 2);
}

#[test]
fn accept_consumes_every_application_by_the_player() {
    let store = store();
    let wolves = found(&store, "Wolves", PlayerId::new(), 10);
    let bears = found(&store, "Bears", PlayerId::new(), 10);
    let applicant = PlayerId::new();

    store.add_request(wolves, applicant, "Dee", NOW).unwrap();
    store.add_request(bears, applicant, "Dee", NOW).unwrap();

    let member = store.accept_request(wolves, applicant, NOW + 5).unwrap();
    assert_eq!(member.role, GuildRole::Member);
    assert_eq!(member.player_name, "Dee");
    assert_eq!(store.guild_id_by_player(applicant).unwrap(), Some(wolves));

    // Both the accepted request and the parallel one are gone.
    assert!(store.list_requests(wolves).unwrap().is_empty());
    assert!(store.list_requests(bears).unwrap().is_empty());

    let err = store.accept_request(bears, applicant, NOW + 6).unwrap_err();
    assert!(matches!(err, StoreError::StaleState));
}

#[test]
fn duplicate_requests_are_rejected() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 10);
    let applicant = PlayerId::new();

    store.add_request(guild, applicant, "Dee", NOW).unwrap();
    let err = store.add_request(guild, applicant, "Dee", NOW).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateRequest));
}

#[test]
fn deny_is_idempotent_and_touches_nothing_else() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 10);
    let first = PlayerId::new();
    let second = PlayerId::new();

    store.add_request(guild, first, "Dee", NOW).unwrap();
    store.add_request(guild, second, "Eve", NOW + 1).unwrap();

    store.deny_request(guild, first).unwrap();
    let err = store.deny_request(guild, first).unwrap_err();
    assert!(matches!(err, StoreError::NotFound));

    let remaining = store.list_requests(guild).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].player_id, second);
}

#[test]
fn delete_removes_children_but_keeps_audit_rows() {
    let store = store();
    let owner = PlayerId::new();
    let guild = found(&store, "Wolves", owner, 10);
    store.add_request(guild, PlayerId::new(), "Dee", NOW).unwrap();
    store
        .append_ledger(guild, "Ada", LedgerDirection::Deposit, Money::from_major(50.0), NOW)
        .unwrap();

    store.delete_guild(guild).unwrap();

    assert!(store.guild_by_id(guild).unwrap().is_none());
    assert!(store.membership_of(owner).unwrap().is_none());
    assert!(store.list_requests(guild).unwrap().is_empty());
    // The audit trail survives the guild.
    assert_eq!(store.ledger_page(guild, 0, 10).unwrap().len(), 1);

    let err = store.delete_guild(guild).unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[test]
fn balance_moves_by_server_side_delta() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 10);

    let after_deposit = store
        .update_balance(guild, Money::from_major(4000.0), false)
        .unwrap();
    assert_eq!(after_deposit, Money::from_major(4000.0));

    let after_set = store
        .update_balance(guild, Money::from_major(-3000.0), false)
        .unwrap();
    assert_eq!(after_set, Money::from_major(1000.0));

    let err = store
        .update_balance(guild, Money::from_major(-2000.0), false)
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientBalance));
    let unchanged = store.guild_by_id(guild).unwrap().unwrap();
    assert_eq!(unchanged.balance, Money::from_major(1000.0));

    // The admin override may drive the balance negative.
    let negative = store
        .update_balance(guild, Money::from_major(-2000.0), true)
        .unwrap();
    assert_eq!(negative, Money::from_major(-1000.0));
}

#[test]
fn transfer_leaves_exactly_one_owner() {
    let store = store();
    let old_owner = PlayerId::new();
    let heir = PlayerId::new();
    let guild = found(&store, "Wolves", old_owner, 10);
    store.add_member(guild, heir, "Bea", NOW).unwrap();

    store
        .transfer_ownership(guild, old_owner, heir, "Bea")
        .unwrap();

    assert_eq!(
        store.role_of(guild, old_owner).unwrap(),
        Some(GuildRole::Admin)
    );
    assert_eq!(store.role_of(guild, heir).unwrap(), Some(GuildRole::Owner));

    let record = store.guild_by_id(guild).unwrap().unwrap();
    assert_eq!(record.owner_id, heir);
    assert_eq!(record.owner_name, "Bea");

    let owners = store
        .members(guild)
        .unwrap()
        .into_iter()
        .filter(|m| m.role == GuildRole::Owner)
        .count();
    assert_eq!(owners, 1);
}

#[test]
fn transfer_requires_current_roles_to_still_hold() {
    let store = store();
    let owner = PlayerId::new();
    let member = PlayerId::new();
    let guild = found(&store, "Wolves", owner, 10);
    store.add_member(guild, member, "Bea", NOW).unwrap();

    // Outsider as heir.
    let err = store
        .transfer_ownership(guild, owner, PlayerId::new(), "Zoe")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));

    // A non-owner cannot hand the guild over.
    let err = store
        .transfer_ownership(guild, member, owner, "Ada")
        .unwrap_err();
    assert!(matches!(err, StoreError::StaleState));
}

#[test]
fn the_owner_row_is_protected() {
    let store = store();
    let owner = PlayerId::new();
    let member = PlayerId::new();
    let guild = found(&store, "Wolves", owner, 10);
    store.add_member(guild, member, "Bea", NOW).unwrap();

    assert!(matches!(
        store.remove_member(guild, owner),
        Err(StoreError::OwnerImmovable)
    ));
    assert!(matches!(
        store.set_role(guild, owner, GuildRole::Member),
        Err(StoreError::OwnerImmovable)
    ));
    assert!(matches!(
        store.set_role(guild, member, GuildRole::Owner),
        Err(StoreError::OwnerImmovable)
    ));

    store.set_role(guild, member, GuildRole::Admin).unwrap();
    assert!(store.is_staff(guild, member).unwrap());

    store.remove_member(guild, member).unwrap();
    assert!(store.membership_of(member).unwrap().is_none());
}

#[test]
fn rename_conflicts_with_other_guilds_only() {
    let store = store();
    let wolves = found(&store, "Wolves", PlayerId::new(), 10);
    let bears = found(&store, "Bears", PlayerId::new(), 10);

    let err = store.rename_guild(bears, "wolves").unwrap_err();
    assert!(matches!(err, StoreError::NameConflict));

    // Changing only the casing of your own name is allowed.
    store.rename_guild(wolves, "WOLVES").unwrap();
    let record = store.guild_by_name("wolves").unwrap().unwrap();
    assert_eq!(record.id, wolves);
    assert_eq!(record.name, "WOLVES");
}

#[test]
fn experience_levels_up_and_grows_capacity() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 10);

    // Leaving level 1 costs 100, leaving level 2 costs 200.
    let progress = store.add_experience(guild, 250, 100, 5).unwrap();
    assert_eq!(progress.level, 2);
    assert_eq!(progress.exp, 150);
    assert_eq!(progress.max_members, 15);
    assert_eq!(progress.levels_gained, 1);
    assert!(progress.leveled_up());

    let progress = store.add_experience(guild, 50, 100, 5).unwrap();
    assert_eq!(progress.level, 3);
    assert_eq!(progress.exp, 0);
    assert_eq!(progress.max_members, 20);

    let idle = store.add_experience(guild, 10, 100, 5).unwrap();
    assert!(!idle.leveled_up());
}

#[test]
fn match_results_update_counters_exactly_once() {
    let store = store();
    let red = found(&store, "Wolves", PlayerId::new(), 10);
    let blue = found(&store, "Bears", PlayerId::new(), 10);

    store
        .record_match_result(red, blue, Some(red), NOW, NOW + 300)
        .unwrap();
    store
        .record_match_result(red, blue, None, NOW + 400, NOW + 700)
        .unwrap();

    let wolves = store.guild_by_id(red).unwrap().unwrap();
    assert_eq!(wolves.pvp_wins, 1);
    assert_eq!(wolves.pvp_losses, 0);
    assert_eq!(wolves.pvp_draws, 1);
    assert_eq!(wolves.pvp_total, 2);

    let bears = store.guild_by_id(blue).unwrap().unwrap();
    assert_eq!(bears.pvp_wins, 0);
    assert_eq!(bears.pvp_losses, 1);
    assert_eq!(bears.pvp_draws, 1);
    assert_eq!(bears.pvp_total, 2);

    let history = store.match_history_page(red, 0, 10).unwrap();
    assert_eq!(history.len(), 2);
    // Newest first.
    assert_eq!(history[0].winner_guild_id, None);
    assert_eq!(history[1].winner_guild_id, Some(red));
}

#[test]
fn teleport_anchor_round_trips_through_json() {
    let store = store();
    let guild = found(&store, "Wolves", PlayerId::new(), 10);
    assert!(store
        .guild_by_id(guild)
        .unwrap()
        .unwrap()
        .teleport_location
        .is_none());

    let anchor = NodeLocation::new("node-east", 120.5, 64.0, -33.25);
    store.set_teleport_location(guild, &anchor).unwrap();

    let stored = store.guild_by_id(guild).unwrap().unwrap();
    assert_eq!(stored.teleport_location, Some(anchor));
}

#[test]
fn members_list_owner_first_then_staff_then_names() {
    let store = store();
    let owner = PlayerId::new();
    let guild = store
        .create_guild("Wolves", owner, "Zoe", 10, NOW)
        .unwrap()
        .id;
    let admin = PlayerId::new();
    store.add_member(guild, admin, "Bea", NOW).unwrap();
    store.set_role(guild, admin, GuildRole::Admin).unwrap();
    store.add_member(guild, PlayerId::new(), "cal", NOW).unwrap();
    store.add_member(guild, PlayerId::new(), "Abe", NOW).unwrap();

    let names = store.member_names(guild).unwrap();
    assert_eq!(names, vec!["Zoe", "Bea", "Abe", "cal"]);
}

#[test]
fn top_guilds_rank_by_level_then_experience() {
    let store = store();
    let low = found(&store, "Sprouts", PlayerId::new(), 10);
    let mid = found(&store, "Bears", PlayerId::new(), 10);
    let high = found(&store, "Wolves", PlayerId::new(), 10);

    store.add_experience(high, 500, 100, 5).unwrap();
    store.add_experience(mid, 120, 100, 5).unwrap();
    store.add_experience(low, 40, 100, 5).unwrap();

    let top: Vec<GuildId> = store
        .top_guilds(2)
        .unwrap()
        .into_iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(top, vec![high, mid]);
}

#[test]
fn reopening_a_database_file_preserves_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guilds.db");
    let owner = PlayerId::new();

    let guild = {
        let store = GuildStore::open(&path).unwrap();
        found(&store, "Wolves", owner, 10)
    };

    let reopened = GuildStore::open(&path).unwrap();
    let record = reopened.guild_by_id(guild).unwrap().unwrap();
    assert_eq!(record.name, "Wolves");
    assert_eq!(reopened.guild_id_by_player(owner).unwrap(), Some(guild));
}
