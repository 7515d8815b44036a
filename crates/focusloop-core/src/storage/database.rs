//! SQLite-based session storage and statistics.
//!
//! Provides persistent storage for:
//! - Recorded sessions
//! - Session statistics (daily and all-time)
//! - Key-value store for the break budget, streak and timer snapshot

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::SessionRecord;
use crate::error::{DatabaseError, Result};
use crate::timer::{BreakBudget, Streak};

const KEY_BREAK_BUDGET: &str = "break_budget";
const KEY_STREAK: &str = "streak";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_sessions: u64,
    pub total_focus_min: u64,
    pub total_break_min: u64,
    pub completed_pomodoros: u64,
    pub today_sessions: u64,
    pub today_focus_min: u64,
}

/// SQLite database for session storage.
///
/// The connection sits behind a mutex so the database can be shared with the
/// background persistence writer.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/focusloop.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&super::data_dir()?.join("focusloop.db"))
    }

    /// Open (and create if needed) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                label         TEXT NOT NULL DEFAULT 'default',
                is_work       INTEGER NOT NULL,
                duration_min  INTEGER NOT NULL,
                interruptions INTEGER NOT NULL DEFAULT 0,
                notes         TEXT,
                completed_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_completed_at ON sessions(completed_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_completed_at_is_work ON sessions(completed_at, is_work);",
        )?;
        Ok(())
    }

    /// Record a session. Returns the new row id.
    pub fn record_session(&self, record: &SessionRecord) -> Result<i64> {
        let completed_at =
            DateTime::<Utc>::from_timestamp_millis(record.end_timestamp).unwrap_or_else(Utc::now);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (label, is_work, duration_min, interruptions, notes, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.label,
                record.is_work,
                record.duration_min,
                record.interruptions,
                record.notes,
                completed_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn stats_today(&self) -> Result<Stats> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT is_work, COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE completed_at >= ?1
             GROUP BY is_work",
        )?;

        let mut stats = Stats::default();
        let rows = stmt.query_map(params![start_of_today()], |row| {
            Ok((
                row.get::<_, bool>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;

        for row in rows {
            let (is_work, count, minutes) = row?;
            stats.total_sessions += count;
            if is_work {
                stats.completed_pomodoros += count;
                stats.total_focus_min += minutes;
                stats.today_sessions += count;
                stats.today_focus_min += minutes;
            } else {
                stats.total_break_min += minutes;
            }
        }
        Ok(stats)
    }

    pub fn stats_all(&self) -> Result<Stats> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT is_work, COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             GROUP BY is_work",
        )?;

        let mut stats = Stats::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, bool>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;

        for row in rows {
            let (is_work, count, minutes) = row?;
            stats.total_sessions += count;
            if is_work {
                stats.completed_pomodoros += count;
                stats.total_focus_min += minutes;
            } else {
                stats.total_break_min += minutes;
            }
        }

        let (today_sessions, today_focus_min) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE is_work = 1 AND completed_at >= ?1",
            params![start_of_today()],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        stats.today_sessions = today_sessions;
        stats.today_focus_min = today_focus_min;

        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            });
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv_get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn kv_set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.kv_set(key, &serde_json::to_string(value)?)
    }

    /// Persisted break budget, zero when never written.
    pub fn break_budget(&self) -> Result<BreakBudget> {
        Ok(self.kv_get_json(KEY_BREAK_BUDGET)?.unwrap_or_default())
    }

    pub fn set_break_budget(&self, budget: &BreakBudget) -> Result<()> {
        self.kv_set_json(KEY_BREAK_BUDGET, budget)
    }

    /// Persisted streak, empty when never written.
    pub fn streak(&self) -> Result<Streak> {
        Ok(self.kv_get_json(KEY_STREAK)?.unwrap_or_default())
    }

    pub fn set_streak(&self, streak: &Streak) -> Result<()> {
        self.kv_set_json(KEY_STREAK, streak)
    }
}

fn start_of_today() -> String {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    format!("{today}T00:00:00+00:00")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session(is_work: bool, minutes: u64) -> SessionRecord {
        SessionRecord {
            duration_min: minutes,
            interruptions: 1,
            label: "default".into(),
            notes: None,
            is_work,
            end_timestamp: Utc::now().timestamp_millis(),
        }
    }

    #[test]
    fn record_and_query() {
        let db = Database::open_memory().unwrap();
        db.record_session(&session(true, 25)).unwrap();
        db.record_session(&session(true, 12)).unwrap();
        db.record_session(&session(false, 5)).unwrap();

        let stats = db.stats_all().unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.completed_pomodoros, 2);
        assert_eq!(stats.total_focus_min, 37);
        assert_eq!(stats.total_break_min, 5);
        assert_eq!(stats.today_sessions, 2);

        let today = db.stats_today().unwrap();
        assert_eq!(today.today_focus_min, 37);
    }

    #[test]
    fn old_sessions_are_not_counted_today() {
        let db = Database::open_memory().unwrap();
        let mut old = session(true, 25);
        old.end_timestamp = 0;
        db.record_session(&old).unwrap();

        assert_eq!(db.stats_today().unwrap(), Stats::default());
        assert_eq!(db.stats_all().unwrap().completed_pomodoros, 1);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }

    #[test]
    fn ledgers_default_when_missing() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.break_budget().unwrap(), BreakBudget::default());
        assert_eq!(db.streak().unwrap(), Streak::default());

        let budget = BreakBudget::new(Duration::from_millis(1_500), 42);
        db.set_break_budget(&budget).unwrap();
        assert_eq!(db.break_budget().unwrap(), budget);
    }

    #[test]
    fn corrupt_kv_value_is_an_error() {
        let db = Database::open_memory().unwrap();
        db.kv_set(KEY_STREAK, "not json").unwrap();
        assert!(db.streak().is_err());
    }
}
