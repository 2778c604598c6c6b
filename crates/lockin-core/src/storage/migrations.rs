//! Database schema migrations for lockin.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult, Transaction, TransactionBehavior};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    // The version is read under the write lock so that two processes opening
    // a fresh file apply each migration once.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    create_schema_version_table(&tx)?;

    let current_version = get_schema_version(&tx);

    if current_version < 1 {
        migrate_v1(&tx)?;
    }
    if current_version < 2 {
        migrate_v2(&tx)?;
    }

    tx.commit()
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: session history, config overrides, engine snapshot, command log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id                       INTEGER PRIMARY KEY AUTOINCREMENT,
            session_type             TEXT NOT NULL,
            state                    TEXT NOT NULL,
            start_time               TEXT NOT NULL,
            end_time                 TEXT NOT NULL,
            planned_duration_minutes INTEGER NOT NULL,
            actual_duration_minutes  REAL NOT NULL,
            bonus_minutes            REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS config (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS engine_state (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            current_state TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commands (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            command    TEXT NOT NULL,
            args       TEXT,
            created_at TEXT NOT NULL,
            processed  INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time);
        CREATE INDEX IF NOT EXISTS idx_sessions_type_state ON sessions(session_type, state);
        CREATE INDEX IF NOT EXISTS idx_commands_processed ON commands(processed, created_at);",
    )?;

    set_schema_version(conn, 1)
}

/// Migration v2: command acknowledgement.
///
/// Adds `correlation_id` so a client can find the command it enqueued, and
/// `processed_at` so it can tell when the engine applied it.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "ALTER TABLE commands ADD COLUMN correlation_id TEXT;
         ALTER TABLE commands ADD COLUMN processed_at TEXT;
         CREATE INDEX IF NOT EXISTS idx_commands_correlation ON commands(correlation_id);",
    )?;

    set_schema_version(conn, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('commands')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(columns.contains(&"correlation_id".to_string()));
        assert!(columns.contains(&"processed_at".to_string()));
    }
}
