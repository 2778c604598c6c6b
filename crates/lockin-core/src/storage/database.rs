//! SQLite persistence shared by the engine and every client process.
//!
//! Four record sets live here:
//! - `sessions`: append-only session history (written by the engine)
//! - `config`: setting overrides (written by clients, validated first)
//! - `engine_state`: the single engine snapshot row plus its heartbeat
//! - `commands`: the append-only command log with a processed flag
//!
//! Every method is a single statement or a single short transaction, so
//! concurrent processes only ever contend on one record at a time.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::engine::{EngineSnapshot, SessionOutcome, SessionType, SnapshotRecord};
use crate::error::{CoreError, DatabaseError};

const DB_FILE: &str = "lockin.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A session about to be written to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub session_type: SessionType,
    pub outcome: SessionOutcome,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub planned_duration_minutes: u32,
    pub actual_duration_minutes: f64,
    pub bonus_minutes: f64,
}

/// A session as stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_type: SessionType,
    pub outcome: SessionOutcome,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub planned_duration_minutes: u32,
    pub actual_duration_minutes: f64,
    pub bonus_minutes: f64,
}

/// The persisted snapshot together with when the engine last wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub snapshot: EngineSnapshot,
    pub updated_at: DateTime<Utc>,
}

/// Handle returned to a client that enqueued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTicket {
    pub id: i64,
    pub correlation_id: Uuid,
}

/// A row of the command log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: i64,
    pub correlation_id: Option<Uuid>,
    pub name: String,
    pub arguments: serde_json::Value,
    pub enqueued_time: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

/// SQLite database for all lockin state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.lockin/lockin.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join(DB_FILE);
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets clients read the snapshot while the engine writes.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── Session history ──────────────────────────────────────────────

    /// Append a finished session to history.
    pub fn log_session(&self, session: &NewSession) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (
                session_type, state, start_time, end_time,
                planned_duration_minutes, actual_duration_minutes, bonus_minutes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.session_type.as_str(),
                session.outcome.as_str(),
                ts(session.start_time),
                ts(session.end_time),
                session.planned_duration_minutes,
                session.actual_duration_minutes,
                session.bonus_minutes,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Sessions whose start time falls in `[start, end)`, oldest first.
    pub fn sessions_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_type, state, start_time, end_time,
                    planned_duration_minutes, actual_duration_minutes, bonus_minutes
             FROM sessions
             WHERE start_time >= ?1 AND start_time < ?2
             ORDER BY start_time ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![ts(start), ts(end)], session_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The session that started most recently.
    pub fn last_session(&self) -> Result<Option<SessionRecord>, DatabaseError> {
        Ok(self.recent_sessions(1, None)?.into_iter().next())
    }

    /// Up to `limit` sessions, newest first, optionally of one type.
    pub fn recent_sessions(
        &self,
        limit: usize,
        session_type: Option<SessionType>,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_type, state, start_time, end_time,
                    planned_duration_minutes, actual_duration_minutes, bonus_minutes
             FROM sessions
             WHERE ?1 IS NULL OR session_type = ?1
             ORDER BY start_time DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![session_type.map(SessionType::as_str), limit as i64],
            session_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Delete one history record. Returns whether it existed.
    pub fn delete_session(&self, id: i64) -> Result<bool, DatabaseError> {
        let n = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ── Engine snapshot ──────────────────────────────────────────────

    /// Read the engine snapshot, if the engine has ever written one.
    ///
    /// A snapshot that fails validation is logged and replaced with idle.
    pub fn load_snapshot(&self) -> Result<Option<StoredSnapshot>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT current_state, updated_at FROM engine_state WHERE id = 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((json, updated_at)) = row else {
            return Ok(None);
        };
        let updated_at = parse_ts(&updated_at).map_err(|message| DatabaseError::CorruptRow {
            table: "engine_state",
            message,
        })?;

        let snapshot = match serde_json::from_str::<SnapshotRecord>(&json) {
            Ok(record) => EngineSnapshot::try_from(record).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding corrupt engine snapshot, resetting to idle");
                EngineSnapshot::idle()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable engine snapshot, resetting to idle");
                EngineSnapshot::idle()
            }
        };

        Ok(Some(StoredSnapshot {
            snapshot,
            updated_at,
        }))
    }

    /// Write the snapshot row. `now` doubles as the engine heartbeat.
    pub fn save_snapshot(
        &self,
        snapshot: &EngineSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let json = serde_json::to_string(&SnapshotRecord::from(snapshot))?;
        self.conn
            .execute(
                "INSERT INTO engine_state (id, current_state, updated_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    current_state = excluded.current_state,
                    updated_at = excluded.updated_at",
                params![json, ts(now)],
            )
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    // ── Command log ──────────────────────────────────────────────────

    /// Append a command for the engine.
    pub fn enqueue_command(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<CommandTicket, CoreError> {
        let correlation_id = Uuid::new_v4();
        let args = if arguments.is_null() {
            None
        } else {
            Some(serde_json::to_string(arguments)?)
        };
        self.conn
            .execute(
                "INSERT INTO commands (correlation_id, command, args, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![correlation_id.to_string(), name, args, ts(now)],
            )
            .map_err(DatabaseError::from)?;
        Ok(CommandTicket {
            id: self.conn.last_insert_rowid(),
            correlation_id,
        })
    }

    /// Unprocessed commands in enqueue order.
    pub fn pending_commands(&self) -> Result<Vec<CommandRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, correlation_id, command, args, created_at, processed, processed_at
             FROM commands
             WHERE processed = 0
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], command_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn command(&self, id: i64) -> Result<Option<CommandRecord>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, correlation_id, command, args, created_at, processed, processed_at
                 FROM commands WHERE id = ?1",
                params![id],
                command_from_row,
            )
            .optional()?)
    }

    pub fn mark_command_processed(&self, id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE commands SET processed = 1, processed_at = ?2
             WHERE id = ?1 AND processed = 0",
            params![id, ts(now)],
        )?;
        Ok(())
    }

    /// Delete processed commands enqueued before `cutoff`.
    pub fn cleanup_old_commands(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        Ok(self.conn.execute(
            "DELETE FROM commands WHERE processed = 1 AND created_at < ?1",
            params![ts(cutoff)],
        )?)
    }

    // ── Config overrides ─────────────────────────────────────────────

    pub fn config_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn config_clear(&self) -> Result<(), DatabaseError> {
        self.conn.execute("DELETE FROM config", [])?;
        Ok(())
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{s}': {e}"))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|m| conversion_error(idx, m))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let session_type: String = row.get(1)?;
    let outcome: String = row.get(2)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        session_type: session_type
            .parse()
            .map_err(|e: crate::error::SessionError| conversion_error(1, e.to_string()))?,
        outcome: SessionOutcome::parse(&outcome)
            .ok_or_else(|| conversion_error(2, format!("unknown session state '{outcome}'")))?,
        start_time: ts_column(row, 3)?,
        end_time: ts_column(row, 4)?,
        planned_duration_minutes: row.get(5)?,
        actual_duration_minutes: row.get(6)?,
        bonus_minutes: row.get(7)?,
    })
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<CommandRecord> {
    let correlation_id = row
        .get::<_, Option<String>>(1)?
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(1, e.to_string())))
        .transpose()?;
    let arguments = match row.get::<_, Option<String>>(3)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| conversion_error(3, e.to_string()))?,
        None => serde_json::Value::Null,
    };
    let processed_at = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(parse_ts(&raw).map_err(|m| conversion_error(6, m))?),
        None => None,
    };
    Ok(CommandRecord {
        id: row.get(0)?,
        correlation_id,
        name: row.get(2)?,
        arguments,
        enqueued_time: ts_column(row, 4)?,
        processed: row.get::<_, i64>(5)? != 0,
        processed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ActiveSession, SessionState};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn work(start: DateTime<Utc>, minutes: i64, outcome: SessionOutcome) -> NewSession {
        NewSession {
            session_type: SessionType::Work,
            outcome,
            start_time: start,
            end_time: start + ChronoDuration::minutes(minutes),
            planned_duration_minutes: minutes as u32,
            actual_duration_minutes: minutes as f64,
            bonus_minutes: 0.0,
        }
    }

    #[test]
    fn log_and_read_back_session() {
        let db = Database::open_memory().unwrap();
        let id = db
            .log_session(&work(t0(), 25, SessionOutcome::Completed))
            .unwrap();
        let last = db.last_session().unwrap().unwrap();
        assert_eq!(last.id, id);
        assert_eq!(last.session_type, SessionType::Work);
        assert_eq!(last.outcome, SessionOutcome::Completed);
        assert_eq!(last.start_time, t0());
        assert_eq!(last.actual_duration_minutes, 25.0);
    }

    #[test]
    fn range_is_half_open() {
        let db = Database::open_memory().unwrap();
        db.log_session(&work(t0(), 25, SessionOutcome::Completed)).unwrap();
        db.log_session(&work(t0() + ChronoDuration::hours(1), 25, SessionOutcome::Abandoned))
            .unwrap();

        let hits = db
            .sessions_in_range(t0(), t0() + ChronoDuration::hours(1))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start_time, t0());
    }

    #[test]
    fn recent_sessions_filters_by_type() {
        let db = Database::open_memory().unwrap();
        db.log_session(&work(t0(), 25, SessionOutcome::Completed)).unwrap();
        let mut rest = work(t0() + ChronoDuration::minutes(30), 5, SessionOutcome::Completed);
        rest.session_type = SessionType::Break;
        db.log_session(&rest).unwrap();

        assert_eq!(db.recent_sessions(10, None).unwrap().len(), 2);
        let breaks = db.recent_sessions(10, Some(SessionType::Break)).unwrap();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].session_type, SessionType::Break);
        assert_eq!(db.recent_sessions(1, None).unwrap()[0].session_type, SessionType::Break);
    }

    #[test]
    fn delete_session_reports_existence() {
        let db = Database::open_memory().unwrap();
        let id = db.log_session(&work(t0(), 25, SessionOutcome::Completed)).unwrap();
        assert!(db.delete_session(id).unwrap());
        assert!(!db.delete_session(id).unwrap());
        assert!(db.last_session().unwrap().is_none());
    }

    #[test]
    fn snapshot_round_trip_and_heartbeat() {
        let db = Database::open_memory().unwrap();
        assert!(db.load_snapshot().unwrap().is_none());

        let snapshot = EngineSnapshot {
            state: SessionState::Running(ActiveSession::new(SessionType::Work, t0(), 25)),
            last_notification_time: None,
        };
        db.save_snapshot(&snapshot, t0()).unwrap();
        let stored = db.load_snapshot().unwrap().unwrap();
        assert_eq!(stored.snapshot, snapshot);
        assert_eq!(stored.updated_at, t0());
    }

    #[test]
    fn corrupt_snapshot_loads_as_idle() {
        let db = Database::open_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO engine_state (id, current_state, updated_at) VALUES (1, ?1, ?2)",
                params![
                    r#"{"session_state":"hibernating","session_type":"work"}"#,
                    ts(t0())
                ],
            )
            .unwrap();
        let stored = db.load_snapshot().unwrap().unwrap();
        assert_eq!(stored.snapshot, EngineSnapshot::idle());
    }

    #[test]
    fn commands_drain_in_enqueue_order() {
        let db = Database::open_memory().unwrap();
        let first = db
            .enqueue_command("start_session", &serde_json::json!({"session_type": "work", "duration_minutes": 25}), t0())
            .unwrap();
        let second = db
            .enqueue_command("quit_session", &serde_json::Value::Null, t0())
            .unwrap();

        let pending = db.pending_commands().unwrap();
        assert_eq!(
            pending.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
        assert_eq!(pending[0].correlation_id, Some(first.correlation_id));
        assert_eq!(pending[0].arguments["duration_minutes"], 25);
        assert!(pending[1].arguments.is_null());

        db.mark_command_processed(first.id, t0()).unwrap();
        let pending = db.pending_commands().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        let done = db.command(first.id).unwrap().unwrap();
        assert!(done.processed);
        assert_eq!(done.processed_at, Some(t0()));
    }

    #[test]
    fn cleanup_only_removes_old_processed_commands() {
        let db = Database::open_memory().unwrap();
        let old = db
            .enqueue_command("quit_session", &serde_json::Value::Null, t0())
            .unwrap();
        let old_pending = db
            .enqueue_command("quit_session", &serde_json::Value::Null, t0())
            .unwrap();
        let recent = db
            .enqueue_command("quit_session", &serde_json::Value::Null, t0() + ChronoDuration::days(8))
            .unwrap();
        db.mark_command_processed(old.id, t0()).unwrap();
        db.mark_command_processed(recent.id, t0()).unwrap();

        let removed = db
            .cleanup_old_commands(t0() + ChronoDuration::days(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(db.command(old.id).unwrap().is_none());
        assert!(db.command(old_pending.id).unwrap().is_some());
        assert!(db.command(recent.id).unwrap().is_some());
    }

    #[test]
    fn config_kv() {
        let db = Database::open_memory().unwrap();
        assert!(db.config_get("short_break_minutes").unwrap().is_none());
        db.config_set("short_break_minutes", "10").unwrap();
        assert_eq!(db.config_get("short_break_minutes").unwrap().as_deref(), Some("10"));
        db.config_clear().unwrap();
        assert!(db.config_get("short_break_minutes").unwrap().is_none());
    }
}
