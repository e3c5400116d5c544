//! Database schema migrations for daybook.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < SCHEMA_VERSION {
        debug!(from = current_version, to = SCHEMA_VERSION, "schema migrated");
    }
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: entries, their bullets and chips, usage counters, kv slots.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS entries (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            local_date    TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            edited_at_ms  INTEGER,
            title         TEXT,
            reflection    TEXT,
            goal          TEXT,
            visibility    TEXT NOT NULL DEFAULT 'everyone',
            UNIQUE (user_id, local_date)
        );

        CREATE TABLE IF NOT EXISTS entry_bullets (
            entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            text     TEXT NOT NULL,
            PRIMARY KEY (entry_id, position)
        );

        CREATE TABLE IF NOT EXISTS entry_chips (
            entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            kind     TEXT NOT NULL,
            label    TEXT NOT NULL,
            value    TEXT NOT NULL,
            PRIMARY KEY (entry_id, position)
        );

        CREATE TABLE IF NOT EXISTS usage_records (
            user_id      TEXT NOT NULL,
            local_date   TEXT NOT NULL,
            seconds_used INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, local_date)
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at_ms);
        CREATE INDEX IF NOT EXISTS idx_entries_user ON entries(user_id, created_at_ms);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: social graph and engagement.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kudos (
            user_id  TEXT NOT NULL,
            entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, entry_id)
        );

        CREATE TABLE IF NOT EXISTS saves (
            user_id  TEXT NOT NULL,
            entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, entry_id)
        );

        CREATE TABLE IF NOT EXISTS hidden_entries (
            user_id  TEXT NOT NULL,
            entry_id TEXT NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, entry_id)
        );

        CREATE TABLE IF NOT EXISTS impressions (
            viewer_id  TEXT NOT NULL,
            entry_id   TEXT NOT NULL,
            author_id  TEXT NOT NULL,
            local_date TEXT NOT NULL,
            UNIQUE (viewer_id, entry_id, local_date)
        );

        CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            region  TEXT
        );

        CREATE TABLE IF NOT EXISTS user_goals (
            user_id TEXT NOT NULL,
            goal    TEXT NOT NULL,
            PRIMARY KEY (user_id, goal)
        );

        CREATE TABLE IF NOT EXISTS friendships (
            user_id   TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id TEXT NOT NULL,
            blocked_id TEXT NOT NULL,
            PRIMARY KEY (blocker_id, blocked_id)
        );

        CREATE INDEX IF NOT EXISTS idx_kudos_entry ON kudos(entry_id);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}
