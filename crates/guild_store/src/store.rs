//! The transactional store behind every guild operation.
//!
//! One SQLite connection guarded by a mutex gives a total order over
//! writes on a node. Every multi-statement operation runs inside one
//! transaction and commits or rolls back as a unit, so callers never
//! observe partial state. All methods are synchronous; async callers go
//! through a blocking-task facade and must not hold the lock across a
//! suspension point.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use guild_types::{GuildId, GuildRole, LedgerDirection, Money, NodeLocation, PlayerId};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::records::{
    GuildRecord, JoinRequest, LedgerEntry, LevelProgress, MatchRecord, MemberRecord,
};
use crate::schema;

/// Durable guild state: guilds, memberships, join requests, the bank
/// audit trail and match history.
pub struct GuildStore {
    conn: Mutex<Connection>,
}

impl GuildStore {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens (or creates) the database file and brings the schema up to
    /// date.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(path = %path.display(), "opening guild database");
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a fresh in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("opening in-memory guild database");
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ========================================================================
    // Guild lifecycle
    // ========================================================================

    /// Creates a guild and its owner membership in one transaction.
    ///
    /// Either both rows exist afterwards or neither does. Fails with
    /// [`StoreError::NameConflict`] when the name is taken
    /// (case-insensitive) and [`StoreError::AlreadyInGuild`] when the
    /// owner already belongs to a guild.
    pub fn create_guild(
        &self,
        name: &str,
        owner: PlayerId,
        owner_name: &str,
        max_members: i32,
        now: i64,
    ) -> Result<GuildRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if name_in_use(&tx, name, None)? {
            return Err(StoreError::NameConflict);
        }
        if in_any_guild(&tx, owner)? {
            return Err(StoreError::AlreadyInGuild);
        }

        tx.execute(
            "INSERT INTO guild (name, owner_id, owner_name, max_members, create_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, owner.to_string(), owner_name, max_members, now],
        )?;
        let id = GuildId(tx.last_insert_rowid() as i32);

        tx.execute(
            "INSERT INTO membership (guild_id, player_id, player_name, role, join_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.0,
                owner.to_string(),
                owner_name,
                GuildRole::Owner.as_str(),
                now
            ],
        )?;
        // A founder's stale applications elsewhere die with the founding.
        tx.execute(
            "DELETE FROM request WHERE player_id = ?1",
            params![owner.to_string()],
        )?;
        tx.commit()?;

        debug!(guild = %id, name, "guild created");
        Ok(GuildRecord {
            id,
            name: name.to_string(),
            owner_id: owner,
            owner_name: owner_name.to_string(),
            level: 1,
            exp: 0,
            balance: Money::ZERO,
            announcement: String::new(),
            icon: String::new(),
            max_members,
            create_time: now,
            pvp_wins: 0,
            pvp_losses: 0,
            pvp_draws: 0,
            pvp_total: 0,
            teleport_location: None,
        })
    }

    /// Deletes the guild together with its memberships and requests in
    /// one transaction. Ledger and match-history rows survive as audit.
    pub fn delete_guild(&self, guild: GuildId) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM membership WHERE guild_id = ?1", params![guild.0])?;
        tx.execute("DELETE FROM request WHERE guild_id = ?1", params![guild.0])?;
        let removed = tx.execute("DELETE FROM guild WHERE id = ?1", params![guild.0])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit()?;

        debug!(guild = %guild, "guild deleted");
        Ok(())
    }

    /// Renames the guild, refusing names held by any other guild.
    pub fn rename_guild(&self, guild: GuildId, new_name: &str) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if name_in_use(&tx, new_name, Some(guild))? {
            return Err(StoreError::NameConflict);
        }
        let changed = tx.execute(
            "UPDATE guild SET name = ?2 WHERE id = ?1",
            params![guild.0, new_name],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_announcement(&self, guild: GuildId, text: &str) -> Result<(), StoreError> {
        self.update_guild_field("announcement", guild, text)
    }

    pub fn set_icon(&self, guild: GuildId, icon: &str) -> Result<(), StoreError> {
        self.update_guild_field("icon", guild, icon)
    }

    /// Stores the teleport anchor as JSON.
    pub fn set_teleport_location(
        &self,
        guild: GuildId,
        location: &NodeLocation,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(location)
            .map_err(|e| StoreError::Corrupt(format!("teleport_location encode: {e}")))?;
        self.update_guild_field("teleport_location", guild, &json)
    }

    fn update_guild_field(
        &self,
        column: &str,
        guild: GuildId,
        value: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        // column names come from the fixed call sites above, never input
        let changed = conn.execute(
            &format!("UPDATE guild SET {column} = ?2 WHERE id = ?1"),
            params![guild.0, value],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ========================================================================
    // Guild reads
    // ========================================================================

    pub fn guild_by_id(&self, guild: GuildId) -> Result<Option<GuildRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM guild WHERE id = ?1")?;
        let mut rows = stmt.query(params![guild.0])?;
        match rows.next()? {
            Some(row) => Ok(Some(GuildRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Case-insensitive name lookup.
    pub fn guild_by_name(&self, name: &str) -> Result<Option<GuildRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM guild WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(GuildRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn guild_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        name_in_use(&conn, name, None)
    }

    /// Guilds ordered by level, then experience, then PvP wins.
    pub fn top_guilds(&self, limit: u32) -> Result<Vec<GuildRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM guild ORDER BY level DESC, exp DESC, pvp_wins DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(GuildRecord::from_row(row)?);
        }
        Ok(out)
    }

    // ========================================================================
    // Join requests
    // ========================================================================

    /// Files a join application.
    pub fn add_request(
        &self,
        guild: GuildId,
        player: PlayerId,
        player_name: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !guild_exists(&tx, guild)? {
            return Err(StoreError::NotFound);
        }
        if in_any_guild(&tx, player)? {
            return Err(StoreError::AlreadyInGuild);
        }
        let pending: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM request WHERE guild_id = ?1 AND player_id = ?2)",
            params![guild.0, player.to_string()],
            |row| row.get(0),
        )?;
        if pending {
            return Err(StoreError::DuplicateRequest);
        }

        tx.execute(
            "INSERT INTO request (guild_id, player_id, player_name, request_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![guild.0, player.to_string(), player_name, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Withdraws the applicant's own request. Absent row is
    /// [`StoreError::NotFound`], never a crash.
    pub fn cancel_request(&self, guild: GuildId, player: PlayerId) -> Result<(), StoreError> {
        self.remove_request(guild, player)
    }

    /// Staff rejection of a request. Idempotence contract matches
    /// [`cancel_request`](Self::cancel_request): a second call on the
    /// same pair reports `NotFound` and touches nothing else.
    pub fn deny_request(&self, guild: GuildId, player: PlayerId) -> Result<(), StoreError> {
        self.remove_request(guild, player)
    }

    fn remove_request(&self, guild: GuildId, player: PlayerId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM request WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, player.to_string()],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn list_requests(&self, guild: GuildId) -> Result<Vec<JoinRequest>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM request WHERE guild_id = ?1 ORDER BY request_time, id",
        )?;
        let mut rows = stmt.query(params![guild.0])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(JoinRequest::from_row(row)?);
        }
        Ok(out)
    }

    /// Consumes the request and inserts the membership in one
    /// transaction: a request is never consumed without producing a
    /// membership, and vice versa. Joining also clears the player's
    /// applications to every other guild.
    pub fn accept_request(
        &self,
        guild: GuildId,
        player: PlayerId,
        now: i64,
    ) -> Result<MemberRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let applicant_name: String = match tx
            .query_row(
                "SELECT player_name FROM request WHERE guild_id = ?1 AND player_id = ?2",
                params![guild.0, player.to_string()],
                |row| row.get(0),
            )
            .optional()?
        {
            Some(name) => name,
            // Listed a moment ago, gone now: denied elsewhere or withdrawn.
            None => return Err(StoreError::StaleState),
        };

        let record = insert_member(&tx, guild, player, &applicant_name, now)?;
        tx.commit()?;

        debug!(guild = %guild, player = %player, "request accepted");
        Ok(record)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Direct admission, used when an invited player accepts. Same
    /// capacity and single-guild checks as the request path.
    pub fn add_member(
        &self,
        guild: GuildId,
        player: PlayerId,
        player_name: &str,
        now: i64,
    ) -> Result<MemberRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let record = insert_member(&tx, guild, player, player_name, now)?;
        tx.commit()?;
        Ok(record)
    }

    /// Removes a member. The owner row is protected; ownership only
    /// moves through [`transfer_ownership`](Self::transfer_ownership) or
    /// [`delete_guild`](Self::delete_guild).
    pub fn remove_member(&self, guild: GuildId, player: PlayerId) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        match role_in(&tx, guild, player)? {
            None => return Err(StoreError::NotFound),
            Some(GuildRole::Owner) => return Err(StoreError::OwnerImmovable),
            Some(_) => {}
        }
        tx.execute(
            "DELETE FROM membership WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, player.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Atomically demotes the old owner to Admin and promotes the new
    /// owner. Exactly one owner row exists again at commit.
    pub fn transfer_ownership(
        &self,
        guild: GuildId,
        old_owner: PlayerId,
        new_owner: PlayerId,
        new_owner_name: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        match role_in(&tx, guild, old_owner)? {
            Some(GuildRole::Owner) => {}
            Some(_) => return Err(StoreError::StaleState),
            None => return Err(StoreError::NotFound),
        }
        match role_in(&tx, guild, new_owner)? {
            Some(GuildRole::Owner) => return Err(StoreError::StaleState),
            Some(_) => {}
            None => return Err(StoreError::NotFound),
        }

        tx.execute(
            "UPDATE membership SET role = 'ADMIN' WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, old_owner.to_string()],
        )?;
        tx.execute(
            "UPDATE membership SET role = 'OWNER', player_name = ?3
             WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, new_owner.to_string(), new_owner_name],
        )?;
        tx.execute(
            "UPDATE guild SET owner_id = ?2, owner_name = ?3 WHERE id = ?1",
            params![guild.0, new_owner.to_string(), new_owner_name],
        )?;
        tx.commit()?;

        debug!(guild = %guild, new_owner = %new_owner, "ownership transferred");
        Ok(())
    }

    /// Promotes or demotes between Admin and Member. The Owner role is
    /// out of reach on both ends.
    pub fn set_role(
        &self,
        guild: GuildId,
        player: PlayerId,
        role: GuildRole,
    ) -> Result<(), StoreError> {
        if role == GuildRole::Owner {
            return Err(StoreError::OwnerImmovable);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        match role_in(&tx, guild, player)? {
            None => return Err(StoreError::NotFound),
            Some(GuildRole::Owner) => return Err(StoreError::OwnerImmovable),
            Some(_) => {}
        }
        tx.execute(
            "UPDATE membership SET role = ?3 WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, player.to_string(), role.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Membership reads
    // ========================================================================

    pub fn guild_id_by_player(&self, player: PlayerId) -> Result<Option<GuildId>, StoreError> {
        let conn = self.lock()?;
        let id: Option<i32> = conn
            .query_row(
                "SELECT guild_id FROM membership WHERE player_id = ?1",
                params![player.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(GuildId))
    }

    pub fn membership_of(&self, player: PlayerId) -> Result<Option<MemberRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM membership WHERE player_id = ?1")?;
        let mut rows = stmt.query(params![player.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(MemberRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn role_of(
        &self,
        guild: GuildId,
        player: PlayerId,
    ) -> Result<Option<GuildRole>, StoreError> {
        let conn = self.lock()?;
        role_in(&conn, guild, player)
    }

    /// Admin or Owner of this guild. The answer is a point-in-time
    /// snapshot; destructive callers re-check inside their own write.
    pub fn is_staff(&self, guild: GuildId, player: PlayerId) -> Result<bool, StoreError> {
        Ok(self
            .role_of(guild, player)?
            .map(|role| role.is_staff())
            .unwrap_or(false))
    }

    pub fn member_count(&self, guild: GuildId) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        member_count_in(&conn, guild)
    }

    /// Members ordered owner first, then admins, then members by name.
    pub fn members(&self, guild: GuildId) -> Result<Vec<MemberRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM membership WHERE guild_id = ?1
             ORDER BY CASE role WHEN 'OWNER' THEN 0 WHEN 'ADMIN' THEN 1 ELSE 2 END,
                      player_name COLLATE NOCASE",
        )?;
        let mut rows = stmt.query(params![guild.0])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(MemberRecord::from_row(row)?);
        }
        Ok(out)
    }

    pub fn member_names(&self, guild: GuildId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .members(guild)?
            .into_iter()
            .map(|m| m.player_name)
            .collect())
    }

    // ========================================================================
    // Bank
    // ========================================================================

    /// Applies a signed delta server-side (`balance = balance + delta`),
    /// never an absolute write, so concurrent mutations from different
    /// nodes cannot lose updates. Returns the new balance read in the
    /// same transaction.
    pub fn update_balance(
        &self,
        guild: GuildId,
        delta: Money,
        allow_negative: bool,
    ) -> Result<Money, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE guild SET balance = balance + ?2 WHERE id = ?1",
            params![guild.0, delta.minor()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        let new_minor: i64 = tx.query_row(
            "SELECT balance FROM guild WHERE id = ?1",
            params![guild.0],
            |row| row.get(0),
        )?;
        if new_minor < 0 && !allow_negative {
            return Err(StoreError::InsufficientBalance);
        }
        tx.commit()?;
        Ok(Money::from_minor(new_minor))
    }

    /// Appends one audit row. Audit rows carry no foreign key and
    /// survive guild deletion.
    pub fn append_ledger(
        &self,
        guild: GuildId,
        actor_name: &str,
        direction: LedgerDirection,
        amount: Money,
        now: i64,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bank_ledger (guild_id, actor_name, direction, amount, time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                guild.0,
                actor_name,
                direction.as_str(),
                amount.minor(),
                now
            ],
        )?;
        Ok(())
    }

    /// Newest-first page of the audit trail. `page` starts at zero.
    pub fn ledger_page(
        &self,
        guild: GuildId,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM bank_ledger WHERE guild_id = ?1
             ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![guild.0, per_page, page * per_page])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(LedgerEntry::from_row(row)?);
        }
        Ok(out)
    }

    // ========================================================================
    // Progression and PvP
    // ========================================================================

    /// Adds experience, applying any level-ups and the matching member
    /// capacity growth in the same transaction. Experience carries over
    /// between levels; the threshold for leaving level `n` is
    /// `exp_per_level * n`.
    pub fn add_experience(
        &self,
        guild: GuildId,
        amount: i64,
        exp_per_level: i64,
        members_per_level: i32,
    ) -> Result<LevelProgress, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let (mut level, mut exp, mut max_members): (i32, i64, i32) = tx
            .query_row(
                "SELECT level, exp, max_members FROM guild WHERE id = ?1",
                params![guild.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;

        exp += amount;
        let mut gained = 0;
        if exp_per_level > 0 {
            let mut threshold = exp_per_level * i64::from(level);
            while exp >= threshold {
                exp -= threshold;
                level += 1;
                max_members += members_per_level;
                gained += 1;
                threshold = exp_per_level * i64::from(level);
            }
        }

        tx.execute(
            "UPDATE guild SET level = ?2, exp = ?3, max_members = ?4 WHERE id = ?1",
            params![guild.0, level, exp, max_members],
        )?;
        tx.commit()?;

        if gained > 0 {
            debug!(guild = %guild, level, "guild leveled up");
        }
        Ok(LevelProgress {
            level,
            exp,
            max_members,
            levels_gained: gained,
        })
    }

    /// Writes the match-history row and bumps both guilds' lifetime
    /// counters exactly once, all in one transaction. `winner == None`
    /// records a draw. Counter updates on a since-deleted guild are
    /// silently skipped; the history row still lands.
    pub fn record_match_result(
        &self,
        red: GuildId,
        blue: GuildId,
        winner: Option<GuildId>,
        start_time: i64,
        end_time: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO match_history
                 (red_guild_id, blue_guild_id, winner_guild_id, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![red.0, blue.0, winner.map(|g| g.0), start_time, end_time],
        )?;
        tx.execute(
            "UPDATE guild SET pvp_total = pvp_total + 1 WHERE id IN (?1, ?2)",
            params![red.0, blue.0],
        )?;
        match winner {
            Some(victor) => {
                let loser = if victor == red { blue } else { red };
                tx.execute(
                    "UPDATE guild SET pvp_wins = pvp_wins + 1 WHERE id = ?1",
                    params![victor.0],
                )?;
                tx.execute(
                    "UPDATE guild SET pvp_losses = pvp_losses + 1 WHERE id = ?1",
                    params![loser.0],
                )?;
            }
            None => {
                tx.execute(
                    "UPDATE guild SET pvp_draws = pvp_draws + 1 WHERE id IN (?1, ?2)",
                    params![red.0, blue.0],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Newest-first page of matches the guild took part in, on either
    /// side.
    pub fn match_history_page(
        &self,
        guild: GuildId,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM match_history WHERE red_guild_id = ?1 OR blue_guild_id = ?1
             ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![guild.0, per_page, page * per_page])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(MatchRecord::from_row(row)?);
        }
        Ok(out)
    }
}

// ============================================================================
// In-transaction helpers
// ============================================================================

fn guild_exists(conn: &Connection, guild: GuildId) -> Result<bool, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM guild WHERE id = ?1)",
        params![guild.0],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn name_in_use(
    conn: &Connection,
    name: &str,
    exclude: Option<GuildId>,
) -> Result<bool, StoreError> {
    let taken: bool = match exclude {
        Some(own) => conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM guild WHERE name = ?1 AND id != ?2)",
            params![name, own.0],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM guild WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?,
    };
    Ok(taken)
}

fn in_any_guild(conn: &Connection, player: PlayerId) -> Result<bool, StoreError> {
    let member: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM membership WHERE player_id = ?1)",
        params![player.to_string()],
        |row| row.get(0),
    )?;
    Ok(member)
}

fn member_count_in(conn: &Connection, guild: GuildId) -> Result<i64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM membership WHERE guild_id = ?1",
        params![guild.0],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn role_in(
    conn: &Connection,
    guild: GuildId,
    player: PlayerId,
) -> Result<Option<GuildRole>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT role FROM membership WHERE guild_id = ?1 AND player_id = ?2",
            params![guild.0, player.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(GuildRole::parse(&text).ok_or_else(|| {
            StoreError::Corrupt(format!("role {text:?}"))
        })?)),
        None => Ok(None),
    }
}

/// Shared admission path for request acceptance and direct invites:
/// capacity and single-guild invariants re-checked inside the caller's
/// transaction, every pending application by the player consumed.
fn insert_member(
    conn: &Connection,
    guild: GuildId,
    player: PlayerId,
    player_name: &str,
    now: i64,
) -> Result<MemberRecord, StoreError> {
    let cap: i64 = conn
        .query_row(
            "SELECT max_members FROM guild WHERE id = ?1",
            params![guild.0],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound)?;
    if member_count_in(conn, guild)? >= cap {
        return Err(StoreError::MemberLimit);
    }
    if in_any_guild(conn, player)? {
        return Err(StoreError::AlreadyInGuild);
    }

    conn.execute(
        "DELETE FROM request WHERE player_id = ?1",
        params![player.to_string()],
    )?;
    conn.execute(
        "INSERT INTO membership (guild_id, player_id, player_name, role, join_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            guild.0,
            player.to_string(),
            player_name,
            GuildRole::Member.as_str(),
            now
        ],
    )?;

    Ok(MemberRecord {
        guild_id: guild,
        player_id: player,
        player_name: player_name.to_string(),
        role: GuildRole::Member,
        join_time: now,
    })
}
