//! SQLite-backed reference implementation of every store.
//!
//! Provides persistent storage for:
//! - Journal entries with their bullets and proof chips
//! - Kudos, saves, hides and impressions
//! - The social graph feed strategies read (friends, blocks, goals, regions)
//! - Per-day usage counters
//! - Key-value slots for local state (drafts)

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{data_dir, migrations};
use crate::backend::{EntryStore, KeyValueStore, UsageStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result, StorageError};
use crate::model::{
    ChipKind, EntryFields, FeedFilter, FeedQuery, Impression, JournalEntry, NewEntry, Page,
    ProofChip, Visibility,
};
use crate::stats::ProfileStats;

/// File name of the database inside [`data_dir`].
pub const DB_FILE: &str = "daybook.db";

const ENTRY_SELECT: &str = "SELECT e.id, e.user_id, e.local_date, e.created_at_ms, e.edited_at_ms,
        e.title, e.reflection, e.goal, e.visibility,
        (SELECT COUNT(*) FROM kudos k WHERE k.entry_id = e.id),
        EXISTS (SELECT 1 FROM kudos k WHERE k.entry_id = e.id AND k.user_id = ?1),
        EXISTS (SELECT 1 FROM saves s WHERE s.entry_id = e.id AND s.user_id = ?1)
     FROM entries e";

/// Entries `?1` may see: own entries, plus others' by visibility minus blocks.
const VISIBLE_TO_VIEWER: &str = "(e.user_id = ?1 OR (
        NOT EXISTS (SELECT 1 FROM blocks b
                    WHERE (b.blocker_id = ?1 AND b.blocked_id = e.user_id)
                       OR (b.blocker_id = e.user_id AND b.blocked_id = ?1))
        AND (e.visibility = 'everyone'
             OR (e.visibility = 'friends' AND EXISTS (
                    SELECT 1 FROM friendships f
                    WHERE f.user_id = e.user_id AND f.friend_id = ?1)))))
    AND NOT EXISTS (SELECT 1 FROM hidden_entries h WHERE h.user_id = ?1 AND h.entry_id = e.id)";

fn filter_clause(filter: FeedFilter) -> &'static str {
    match filter {
        FeedFilter::All => "1",
        FeedFilter::Discover => {
            "e.user_id <> ?1 AND e.visibility = 'everyone'
             AND NOT EXISTS (SELECT 1 FROM friendships f WHERE f.user_id = ?1 AND f.friend_id = e.user_id)"
        }
        FeedFilter::Friends => {
            "EXISTS (SELECT 1 FROM friendships f WHERE f.user_id = ?1 AND f.friend_id = e.user_id)"
        }
        FeedFilter::Saved => {
            "EXISTS (SELECT 1 FROM saves s WHERE s.user_id = ?1 AND s.entry_id = e.id)"
        }
        FeedFilter::SimilarGoals => {
            "e.user_id <> ?1 AND EXISTS (
                SELECT 1 FROM user_goals mine JOIN user_goals theirs ON mine.goal = theirs.goal
                WHERE mine.user_id = ?1 AND theirs.user_id = e.user_id)"
        }
        FeedFilter::Nearby => {
            "e.user_id <> ?1 AND EXISTS (
                SELECT 1 FROM profiles mine JOIN profiles theirs ON mine.region = theirs.region
                WHERE mine.user_id = ?1 AND theirs.user_id = e.user_id AND mine.region IS NOT NULL)"
        }
    }
}

fn timestamp(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(3, ms))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    let visibility: String = row.get(8)?;
    let visibility = visibility.parse::<Visibility>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let edited_at: Option<i64> = row.get(4)?;
    Ok(JournalEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        local_date: row.get(2)?,
        created_at: timestamp(row.get(3)?)?,
        edited_at: edited_at.map(timestamp).transpose()?,
        title: row.get(5)?,
        reflection: row.get(6)?,
        goal: row.get(7)?,
        bullets: Vec::new(),
        chips: Vec::new(),
        visibility,
        kudos_count: row.get(9)?,
        has_kudos: row.get(10)?,
        has_saved: row.get(11)?,
    })
}

fn load_children(conn: &Connection, entry: &mut JournalEntry) -> rusqlite::Result<()> {
    let mut stmt = conn
        .prepare_cached("SELECT text FROM entry_bullets WHERE entry_id = ?1 ORDER BY position")?;
    entry.bullets = stmt
        .query_map(params![entry.id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT kind, label, value FROM entry_chips WHERE entry_id = ?1 ORDER BY position",
    )?;
    entry.chips = stmt
        .query_map(params![entry.id], |row| {
            let kind: String = row.get(0)?;
            Ok(ProofChip {
                kind: ChipKind::parse(&kind),
                label: row.get(1)?,
                value: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(())
}

fn write_children(conn: &Connection, entry_id: &str, fields: &EntryFields) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM entry_bullets WHERE entry_id = ?1", params![entry_id])?;
    conn.execute("DELETE FROM entry_chips WHERE entry_id = ?1", params![entry_id])?;
    for (i, bullet) in fields.bullets.iter().enumerate() {
        conn.execute(
            "INSERT INTO entry_bullets (entry_id, position, text) VALUES (?1, ?2, ?3)",
            params![entry_id, i as i64, bullet],
        )?;
    }
    for (i, chip) in fields.chips.iter().enumerate() {
        conn.execute(
            "INSERT INTO entry_chips (entry_id, position, kind, label, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entry_id, i as i64, chip.kind.as_str(), chip.label, chip.value],
        )?;
    }
    Ok(())
}

/// Entry by id, hydrated for `viewer_id`.
fn load_entry(conn: &Connection, entry_id: &str, viewer_id: &str) -> Result<Option<JournalEntry>> {
    let sql = format!("{ENTRY_SELECT} WHERE e.id = ?2");
    let entry = conn
        .query_row(&sql, params![viewer_id, entry_id], entry_from_row)
        .optional()
        .map_err(StorageError::from)?;
    match entry {
        Some(mut entry) => {
            load_children(conn, &mut entry).map_err(StorageError::from)?;
            Ok(Some(entry))
        }
        None => Ok(None),
    }
}

fn owned_entry(conn: &Connection, entry_id: &str, owner_id: &str) -> Result<JournalEntry> {
    load_entry(conn, entry_id, owner_id)?
        .filter(|e| e.user_id == owner_id)
        .ok_or_else(|| CoreError::NotFound(format!("entry {entry_id}")))
}

/// SQLite database for entries, engagement and usage.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Open the database at `~/.config/daybook/daybook.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join(DB_FILE))
    }

    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        Self::init(conn)
    }

    /// Stamp `created_at` from `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Social graph ─────────────────────────────────────────────────

    /// Record a mutual friendship.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn add_friends(&self, a: &str, b: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
            params![a, b],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn block(&self, blocker: &str, blocked: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id) VALUES (?1, ?2)",
                params![blocker, blocked],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the insert fails.
    pub fn add_goal(&self, user: &str, goal: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO user_goals (user_id, goal) VALUES (?1, ?2)",
                params![user, goal.trim().to_lowercase()],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the upsert fails.
    pub fn set_region(&self, user: &str, region: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO profiles (user_id, region) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET region = excluded.region",
                params![user, region],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    // ── Profile ──────────────────────────────────────────────────────

    /// Streaks, entry count and kudos received for `user`.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub fn profile_stats(&self, user: &str, today: &str) -> Result<ProfileStats> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT local_date FROM entries WHERE user_id = ?1")
            .map_err(StorageError::from)?;
        let dates = stmt
            .query_map(params![user], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StorageError::from)?;
        let kudos: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM kudos k JOIN entries e ON e.id = k.entry_id WHERE e.user_id = ?1",
                params![user],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(ProfileStats::from_dates(&dates, today, kudos.max(0) as u64))
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| StorageError::from(e).into())
    }

    /// Set a value in the kv store.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(StorageError::from)?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for Database {
    async fn entry_for_date(
        &self,
        user_id: &str,
        local_date: &str,
    ) -> Result<Option<JournalEntry>> {
        let conn = self.conn();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM entries WHERE user_id = ?1 AND local_date = ?2",
                params![user_id, local_date],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        match id {
            Some(id) => load_entry(&conn, &id, user_id),
            None => Ok(None),
        }
    }

    async fn insert_entry(&self, new: NewEntry) -> Result<JournalEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = self.clock.now();
        let conn = self.conn();
        let tx = conn.unchecked_transaction().map_err(StorageError::from)?;
        let inserted = tx.execute(
            "INSERT INTO entries (id, user_id, local_date, created_at_ms, title, reflection, goal, visibility)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                new.user_id,
                new.local_date,
                created_at.timestamp_millis(),
                new.fields.title,
                new.fields.reflection,
                new.fields.goal,
                new.fields.visibility.as_str(),
            ],
        );
        if let Err(e) = inserted {
            return Err(match StorageError::from(e) {
                StorageError::UniqueViolation(_) => CoreError::AlreadyPosted {
                    local_date: new.local_date,
                },
                other => other.into(),
            });
        }
        write_children(&tx, &id, &new.fields).map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        debug!(entry = %id, user = %new.user_id, "entry inserted");
        owned_entry(&conn, &id, &new.user_id)
    }

    async fn update_entry(
        &self,
        entry_id: &str,
        owner_id: &str,
        fields: EntryFields,
        edited_at: DateTime<Utc>,
    ) -> Result<JournalEntry> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction().map_err(StorageError::from)?;
        let changed = tx
            .execute(
                "UPDATE entries SET title = ?1, reflection = ?2, goal = ?3, visibility = ?4, edited_at_ms = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![
                    fields.title,
                    fields.reflection,
                    fields.goal,
                    fields.visibility.as_str(),
                    edited_at.timestamp_millis(),
                    entry_id,
                    owner_id,
                ],
            )
            .map_err(StorageError::from)?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("entry {entry_id}")));
        }
        write_children(&tx, entry_id, &fields).map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        owned_entry(&conn, entry_id, owner_id)
    }

    async fn update_visibility(
        &self,
        entry_id: &str,
        owner_id: &str,
        visibility: Visibility,
    ) -> Result<JournalEntry> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE entries SET visibility = ?1 WHERE id = ?2 AND user_id = ?3",
                params![visibility.as_str(), entry_id, owner_id],
            )
            .map_err(StorageError::from)?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("entry {entry_id}")));
        }
        owned_entry(&conn, entry_id, owner_id)
    }

    async fn delete_entry(&self, entry_id: &str, owner_id: &str) -> Result<JournalEntry> {
        let conn = self.conn();
        let entry = owned_entry(&conn, entry_id, owner_id)?;
        let tx = conn.unchecked_transaction().map_err(StorageError::from)?;
        tx.execute("DELETE FROM impressions WHERE entry_id = ?1", params![entry_id])
            .map_err(StorageError::from)?;
        tx.execute(
            "DELETE FROM entries WHERE id = ?1 AND user_id = ?2",
            params![entry_id, owner_id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(entry)
    }

    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page> {
        let sql = format!(
            "{ENTRY_SELECT}
             WHERE (?2 IS NULL OR e.created_at_ms < ?2)
               AND {VISIBLE_TO_VIEWER}
               AND {}
             ORDER BY e.created_at_ms DESC, e.id DESC
             LIMIT ?3",
            filter_clause(query.filter)
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
        let cursor = query.cursor.map(|c| c.timestamp_millis());
        let mut entries = stmt
            .query_map(
                params![query.viewer_id, cursor, query.page_size as i64],
                entry_from_row,
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(StorageError::from)?;
        for entry in &mut entries {
            load_children(&conn, entry).map_err(StorageError::from)?;
        }
        Ok(Page::new(entries, query.page_size))
    }

    async fn set_kudos(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()> {
        let sql = if on {
            "INSERT OR IGNORE INTO kudos (user_id, entry_id) VALUES (?1, ?2)"
        } else {
            "DELETE FROM kudos WHERE user_id = ?1 AND entry_id = ?2"
        };
        self.conn()
            .execute(sql, params![viewer_id, entry_id])
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn set_saved(&self, viewer_id: &str, entry_id: &str, on: bool) -> Result<()> {
        let sql = if on {
            "INSERT OR IGNORE INTO saves (user_id, entry_id) VALUES (?1, ?2)"
        } else {
            "DELETE FROM saves WHERE user_id = ?1 AND entry_id = ?2"
        };
        self.conn()
            .execute(sql, params![viewer_id, entry_id])
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn hide_entry(&self, viewer_id: &str, entry_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO hidden_entries (user_id, entry_id) VALUES (?1, ?2)",
                params![viewer_id, entry_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn record_impressions(&self, impressions: &[Impression]) -> Result<()> {
        let conn = self.conn();
        let mut duplicate = None;
        for imp in impressions {
            let inserted = conn.execute(
                "INSERT INTO impressions (viewer_id, entry_id, author_id, local_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![imp.viewer_id, imp.entry_id, imp.author_id, imp.local_date],
            );
            match inserted.map_err(StorageError::from) {
                Ok(_) => {}
                Err(err @ StorageError::UniqueViolation(_)) => duplicate = Some(err),
                Err(err) => return Err(err.into()),
            }
        }
        match duplicate {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UsageStore for Database {
    async fn load_usage(&self, user_id: &str, local_date: &str) -> Result<Option<u64>> {
        let seconds: Option<i64> = self
            .conn()
            .query_row(
                "SELECT seconds_used FROM usage_records WHERE user_id = ?1 AND local_date = ?2",
                params![user_id, local_date],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(seconds.map(|s| s.max(0) as u64))
    }

    async fn save_usage(&self, user_id: &str, local_date: &str, seconds: u64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO usage_records (user_id, local_date, seconds_used) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, local_date)
                 DO UPDATE SET seconds_used = MAX(seconds_used, excluded.seconds_used)",
                params![user_id, local_date, seconds as i64],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.kv_get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.kv_set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.kv_delete(key)
    }
}
