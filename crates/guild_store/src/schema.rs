//! Database schema definition and versioning.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Current schema version, bumped whenever the table layout changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Brings the database up to [`SCHEMA_VERSION`], creating tables on a
/// fresh file.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current = schema_version(conn)?;

    if current == 0 {
        info!(version = SCHEMA_VERSION, "creating guild schema");
        conn.execute_batch(TABLES)?;
        conn.execute_batch(INDEXES)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current < SCHEMA_VERSION {
        info!(from = current, to = SCHEMA_VERSION, "migrating guild schema");
        // No migrations yet; the first layout change adds a step here.
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Reads the stored schema version, `0` on an uninitialized database.
fn schema_version(conn: &Connection) -> Result<i32, StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Core tables.
///
/// `bank_ledger` and `match_history` deliberately carry no foreign key:
/// audit rows outlive the guild they describe.
const TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS guild (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    owner_id TEXT NOT NULL,
    owner_name TEXT NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    exp INTEGER NOT NULL DEFAULT 0,

    -- minor currency units (hundredths)
    balance INTEGER NOT NULL DEFAULT 0,

    announcement TEXT NOT NULL DEFAULT '',
    icon TEXT NOT NULL DEFAULT '',
    max_members INTEGER NOT NULL,
    create_time INTEGER NOT NULL,

    pvp_wins INTEGER NOT NULL DEFAULT 0,
    pvp_losses INTEGER NOT NULL DEFAULT 0,
    pvp_draws INTEGER NOT NULL DEFAULT 0,
    pvp_total INTEGER NOT NULL DEFAULT 0,

    -- JSON NodeLocation, NULL until an anchor is set
    teleport_location TEXT
);

CREATE TABLE IF NOT EXISTS membership (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id INTEGER NOT NULL,
    player_id TEXT NOT NULL UNIQUE,
    player_name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('OWNER', 'ADMIN', 'MEMBER')),
    join_time INTEGER NOT NULL,
    FOREIGN KEY (guild_id) REFERENCES guild(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    player_name TEXT NOT NULL,
    request_time INTEGER NOT NULL,
    UNIQUE (guild_id, player_id),
    FOREIGN KEY (guild_id) REFERENCES guild(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS bank_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id INTEGER NOT NULL,
    actor_name TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('deposit', 'withdraw')),
    amount INTEGER NOT NULL,
    time INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS match_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    red_guild_id INTEGER NOT NULL,
    blue_guild_id INTEGER NOT NULL,
    winner_guild_id INTEGER,
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_membership_guild ON membership(guild_id);
CREATE INDEX IF NOT EXISTS idx_request_guild ON request(guild_id);
CREATE INDEX IF NOT EXISTS idx_request_player ON request(player_id);
CREATE INDEX IF NOT EXISTS idx_ledger_guild ON bank_ledger(guild_id, id);
CREATE INDEX IF NOT EXISTS idx_history_red ON match_history(red_guild_id, id);
CREATE INDEX IF NOT EXISTS idx_history_blue ON match_history(blue_guild_id, id);
"#;
