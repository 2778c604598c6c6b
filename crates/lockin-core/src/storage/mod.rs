mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, ConfigValue, Settings, MAX_COUNT, MAX_MINUTES};
pub use database::{
    CommandRecord, CommandTicket, Database, NewSession, SessionRecord, StoredSnapshot,
};

use std::path::PathBuf;

use crate::error::CoreError;

/// Returns `~/.lockin/`, or `$LOCKIN_HOME` when set.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, CoreError> {
    let dir = match std::env::var_os("LOCKIN_HOME") {
        Some(custom) => PathBuf::from(custom),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lockin"),
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
