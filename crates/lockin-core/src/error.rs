//! Core error types for lockin-core.
//!
//! Errors are split by who has to deal with them: [`SessionError`] and
//! [`ConfigError`] carry a reason meant for the user, while
//! [`DatabaseError`] and [`SnapshotError`] are environment problems the
//! engine logs and survives.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for lockin-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A state-machine operation was rejected
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Statistics query input was rejected
    #[error("{0}")]
    Period(#[from] PeriodError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Another process holds the write lock past the busy timeout
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Key is not part of the settings schema
    #[error("Unknown configuration key: {key} (valid keys: {})", .valid.join(", "))]
    UnknownKey { key: String, valid: Vec<&'static str> },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Rejections from the session state machine.
///
/// These are expected business-rule outcomes, not faults. The `Display`
/// text is the reason shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session already in progress")]
    AlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Duration must be positive")]
    NonPositiveDuration,

    #[error("Duration cannot exceed 24 hours (1440 minutes)")]
    DurationTooLong,

    #[error("Invalid session type: {0}")]
    InvalidSessionType(String),

    #[error("Invalid break type: {0}")]
    InvalidBreakType(String),

    #[error("Not in decision window")]
    NotAwaitingDecision,

    #[error("Not in a break session")]
    NotABreak,

    #[error("Break not running")]
    BreakNotRunning,

    #[error("Too late to switch to short break")]
    TooLateForShortBreak,

    #[error("Long break duration already elapsed")]
    LongBreakElapsed,
}

/// A persisted engine snapshot that cannot be trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Invalid session_state '{0}'")]
    UnknownState(String),

    #[error("Invalid session_type '{0}'")]
    UnknownType(String),

    #[error("Missing field '{field}' for session_state '{state}'")]
    MissingField { state: String, field: &'static str },
}

/// Bad input to a statistics query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Unknown period '{0}' (expected today, week, month or year)")]
    UnknownPeriod(String),

    #[error("Invalid date '{0}': expected DDMMYY")]
    InvalidDate(String),

    #[error("Invalid year '{0}': expected YYYY")]
    InvalidYear(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if matches!(
                    inner.code,
                    rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy
                ) {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_lists_valid_keys() {
        let err = ConfigError::UnknownKey {
            key: "nope".into(),
            valid: vec!["a", "b"],
        };
        assert_eq!(
            err.to_string(),
            "Unknown configuration key: nope (valid keys: a, b)"
        );
    }

    #[test]
    fn busy_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }
}
