//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Services call store methods; they never execute SQL directly.
//! Multi-statement operations wrap their calls in `begin_write()` so
//! the whole operation commits or rolls back as one.

mod account;
mod complaint;
mod deputy;
mod rating;
mod score;

pub use account::OrphanGrant;

use crate::{
    error::{StandingError, StandingResult},
    event::{EventLogEntry, StandingEvent},
    types::{from_millis, to_millis, Timestamp, UnknownVariant},
};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

pub struct StandingStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    busy_timeout_ms: u64,
}

impl StandingStore {
    pub fn open(path: &str) -> StandingResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open (or create) the database at `path`. Concurrent handlers each
    /// open their own connection; the busy timeout makes competing writers
    /// queue instead of failing with SQLITE_BUSY.
    pub fn open_with_timeout(path: &str, busy_timeout_ms: u64) -> StandingResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            busy_timeout_ms,
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> StandingResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        })
    }

    /// Open a second connection to the same database.
    /// For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> StandingResult<Self> {
        match &self.path {
            Some(p) => Self::open_with_timeout(p, self.busy_timeout_ms),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run more than once.
    pub fn migrate(&self) -> StandingResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_accounts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_deputies.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_complaints.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_ranking_and_events.sql"))?;
        Ok(())
    }

    /// Start a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so a read-compare-write sequence inside it cannot interleave
    /// with another connection's writes. Dropping without `commit()` rolls back.
    pub fn begin_write(&self) -> StandingResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?)
    }

    /// Start a read transaction: every read inside sees one snapshot.
    pub fn begin_read(&self) -> StandingResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        source: &str,
        occurred_at: Timestamp,
        event: &StandingEvent,
    ) -> StandingResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (occurred_at, source, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                to_millis(occurred_at),
                source,
                event.type_name(),
                serde_json::to_string(event)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent events, newest last.
    pub fn recent_events(&self, limit: usize) -> StandingResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occurred_at, source, event_type, payload FROM (
                 SELECT * FROM event_log ORDER BY id DESC LIMIT ?1
             ) ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    occurred_at: from_millis(row.get(1)?),
                    source:      row.get(2)?,
                    event_type:  row.get(3)?,
                    payload:     row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> StandingResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// True when `err` is a UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Read a text column into any `FromStr` enum.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: UnknownVariant| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_millis(ms: Option<i64>) -> Option<Timestamp> {
    ms.map(from_millis)
}

impl From<UnknownVariant> for StandingError {
    fn from(e: UnknownVariant) -> Self {
        StandingError::Validation(e.to_string())
    }
}
