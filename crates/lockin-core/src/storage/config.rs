//! Typed settings layered over the `config` table.
//!
//! Each key has a built-in default and a validator. Only overrides are
//! stored; resetting deletes them. Values are kept as JSON text so that
//! numbers and booleans read back with their type.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Database;
use crate::engine::BreakKind;
use crate::error::{ConfigError, CoreError};

/// Upper bound for every minute-valued setting.
pub const MAX_MINUTES: u32 = 1440;
/// Upper bound for every count-valued setting.
pub const MAX_COUNT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Whole minutes in (0, 1440], or [0, 1440] when zero means unlimited.
    Minutes { allow_zero: bool },
    /// Whole count in (0, 100].
    Count,
    Bool,
}

/// A validated setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Number(u32),
    Bool(bool),
}

impl ConfigValue {
    fn as_u32(self) -> Option<u32> {
        match self {
            ConfigValue::Number(n) => Some(n),
            ConfigValue::Bool(_) => None,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(b),
            ConfigValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

struct KeySpec {
    name: &'static str,
    default: ConfigValue,
    kind: Kind,
}

const SCHEMA: &[KeySpec] = &[
    KeySpec {
        name: "short_break_minutes",
        default: ConfigValue::Number(5),
        kind: Kind::Minutes { allow_zero: false },
    },
    KeySpec {
        name: "long_break_minutes",
        default: ConfigValue::Number(15),
        kind: Kind::Minutes { allow_zero: false },
    },
    // Every Nth completed work session earns a long break.
    KeySpec {
        name: "long_break_every",
        default: ConfigValue::Number(4),
        kind: Kind::Count,
    },
    // Shorter work sessions are scrapped instead of logged as abandoned.
    KeySpec {
        name: "abandon_threshold_minutes",
        default: ConfigValue::Number(5),
        kind: Kind::Minutes { allow_zero: false },
    },
    // Shorter breaks are scrapped instead of logged as ended early.
    KeySpec {
        name: "break_scrap_threshold_minutes",
        default: ConfigValue::Number(2),
        kind: Kind::Minutes { allow_zero: false },
    },
    KeySpec {
        name: "decision_window_minutes",
        default: ConfigValue::Number(3),
        kind: Kind::Minutes { allow_zero: false },
    },
    KeySpec {
        name: "auto_attach",
        default: ConfigValue::Bool(false),
        kind: Kind::Bool,
    },
    KeySpec {
        name: "default_to_overtime",
        default: ConfigValue::Bool(true),
        kind: Kind::Bool,
    },
    // 0 = unlimited
    KeySpec {
        name: "overtime_max_minutes",
        default: ConfigValue::Number(60),
        kind: Kind::Minutes { allow_zero: true },
    },
];

fn entry_for(key: &str) -> Result<&'static KeySpec, ConfigError> {
    SCHEMA
        .iter()
        .find(|entry| entry.name == key)
        .ok_or_else(|| ConfigError::UnknownKey {
            key: key.to_string(),
            valid: Config::keys(),
        })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate(entry: &KeySpec, raw: &str) -> Result<ConfigValue, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: entry.name.to_string(),
        message,
    };

    match entry.kind {
        Kind::Bool => parse_bool(raw)
            .map(ConfigValue::Bool)
            .ok_or_else(|| invalid("must be true or false".into())),
        Kind::Minutes { allow_zero } => {
            let n: i64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{raw}' is not a whole number of minutes")))?;
            if n < 0 || (n == 0 && !allow_zero) {
                return Err(invalid("must be positive".into()));
            }
            if n > i64::from(MAX_MINUTES) {
                return Err(invalid(format!(
                    "cannot exceed {MAX_MINUTES} minutes (24 hours)"
                )));
            }
            Ok(ConfigValue::Number(n as u32))
        }
        Kind::Count => {
            let n: i64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{raw}' is not a whole number")))?;
            if n <= 0 {
                return Err(invalid("must be positive".into()));
            }
            if n > i64::from(MAX_COUNT) {
                return Err(invalid(format!("cannot exceed {MAX_COUNT}")));
            }
            Ok(ConfigValue::Number(n as u32))
        }
    }
}

/// Settings resolved from defaults plus stored overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_every: u32,
    pub abandon_threshold_minutes: u32,
    pub break_scrap_threshold_minutes: u32,
    pub decision_window_minutes: u32,
    pub auto_attach: bool,
    pub default_to_overtime: bool,
    /// 0 means unlimited.
    pub overtime_max_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
            abandon_threshold_minutes: 5,
            break_scrap_threshold_minutes: 2,
            decision_window_minutes: 3,
            auto_attach: false,
            default_to_overtime: true,
            overtime_max_minutes: 60,
        }
    }
}

impl Settings {
    pub fn break_minutes(&self, kind: BreakKind) -> u32 {
        match kind {
            BreakKind::Short => self.short_break_minutes,
            BreakKind::Long => self.long_break_minutes,
        }
    }
}

/// Config resolver bound to a database handle.
pub struct Config<'a> {
    db: &'a Database,
}

impl<'a> Config<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All valid keys, in schema order.
    pub fn keys() -> Vec<&'static str> {
        SCHEMA.iter().map(|entry| entry.name).collect()
    }

    /// Effective value for `key`: the stored override if it still
    /// validates, otherwise the default.
    pub fn get(&self, key: &str) -> Result<ConfigValue, CoreError> {
        let entry = entry_for(key)?;
        Ok(self.resolve(entry)?)
    }

    /// Validate and persist an override.
    pub fn set(&self, key: &str, raw: &str) -> Result<ConfigValue, CoreError> {
        let entry = entry_for(key)?;
        let value = validate(entry, raw)?;
        self.db.config_set(entry.name, &serde_json::to_string(&value)?)?;
        tracing::debug!(key = entry.name, %value, "config updated");
        Ok(value)
    }

    /// Drop every override.
    pub fn reset(&self) -> Result<(), CoreError> {
        self.db.config_clear()?;
        Ok(())
    }

    /// Every key with its effective value, in schema order.
    pub fn all(&self) -> Result<Vec<(&'static str, ConfigValue)>, CoreError> {
        SCHEMA
            .iter()
            .map(|entry| Ok((entry.name, self.resolve(entry)?)))
            .collect()
    }

    pub fn settings(&self) -> Result<Settings, CoreError> {
        let number = |key: &str| -> Result<u32, CoreError> {
            self.get(key)?
                .as_u32()
                .ok_or_else(|| CoreError::Custom(format!("{key} is not numeric")))
        };
        let flag = |key: &str| -> Result<bool, CoreError> {
            self.get(key)?
                .as_bool()
                .ok_or_else(|| CoreError::Custom(format!("{key} is not a boolean")))
        };

        Ok(Settings {
            short_break_minutes: number("short_break_minutes")?,
            long_break_minutes: number("long_break_minutes")?,
            long_break_every: number("long_break_every")?,
            abandon_threshold_minutes: number("abandon_threshold_minutes")?,
            break_scrap_threshold_minutes: number("break_scrap_threshold_minutes")?,
            decision_window_minutes: number("decision_window_minutes")?,
            auto_attach: flag("auto_attach")?,
            default_to_overtime: flag("default_to_overtime")?,
            overtime_max_minutes: number("overtime_max_minutes")?,
        })
    }

    fn resolve(&self, entry: &KeySpec) -> Result<ConfigValue, crate::error::DatabaseError> {
        let Some(stored) = self.db.config_get(entry.name)? else {
            return Ok(entry.default);
        };
        // Stored as JSON, but tolerate a bare string written by hand.
        let raw = match serde_json::from_str::<serde_json::Value>(&stored) {
            Ok(serde_json::Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(_) => stored,
        };
        match validate(entry, &raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(key = entry.name, error = %e, "ignoring stored override");
                Ok(entry.default)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings_default() {
        let db = Database::open_memory().unwrap();
        let settings = Config::new(&db).settings().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn short_break_range_is_enforced() {
        let db = Database::open_memory().unwrap();
        let config = Config::new(&db);

        assert!(config.set("short_break_minutes", "0").is_err());
        assert!(config.set("short_break_minutes", "10000").is_err());
        assert_eq!(
            config.set("short_break_minutes", "10").unwrap(),
            ConfigValue::Number(10)
        );
        assert_eq!(
            config.get("short_break_minutes").unwrap(),
            ConfigValue::Number(10)
        );

        config.reset().unwrap();
        assert_eq!(
            config.get("short_break_minutes").unwrap(),
            ConfigValue::Number(5)
        );
    }

    #[test]
    fn overtime_max_allows_zero() {
        let db = Database::open_memory().unwrap();
        let config = Config::new(&db);
        assert_eq!(
            config.set("overtime_max_minutes", "0").unwrap(),
            ConfigValue::Number(0)
        );
        assert!(config.set("overtime_max_minutes", "-1").is_err());
        assert!(config.set("decision_window_minutes", "0").is_err());
    }

    #[test]
    fn count_keys_are_capped_at_100() {
        let db = Database::open_memory().unwrap();
        let config = Config::new(&db);
        assert!(config.set("long_break_every", "101").is_err());
        assert!(config.set("long_break_every", "0").is_err());
        assert_eq!(
            config.set("long_break_every", "100").unwrap(),
            ConfigValue::Number(100)
        );
    }

    #[test]
    fn bool_spellings() {
        let db = Database::open_memory().unwrap();
        let config = Config::new(&db);
        for raw in ["true", "YES", "on", "1"] {
            assert_eq!(config.set("auto_attach", raw).unwrap(), ConfigValue::Bool(true));
        }
        for raw in ["false", "No", "OFF", "0"] {
            assert_eq!(config.set("auto_attach", raw).unwrap(), ConfigValue::Bool(false));
        }
        assert!(config.set("auto_attach", "maybe").is_err());
    }

    #[test]
    fn unknown_key_is_rejected_with_valid_keys() {
        let db = Database::open_memory().unwrap();
        let err = Config::new(&db).set("theme", "dark").unwrap_err();
        match err {
            CoreError::Config(ConfigError::UnknownKey { key, valid }) => {
                assert_eq!(key, "theme");
                assert!(valid.contains(&"short_break_minutes"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_stored_override_falls_back_to_default() {
        let db = Database::open_memory().unwrap();
        db.config_set("long_break_minutes", "\"soon\"").unwrap();
        assert_eq!(
            Config::new(&db).get("long_break_minutes").unwrap(),
            ConfigValue::Number(15)
        );
    }

    #[test]
    fn all_lists_every_key() {
        let db = Database::open_memory().unwrap();
        let all = Config::new(&db).all().unwrap();
        assert_eq!(all.len(), Config::keys().len());
        assert_eq!(all[0], ("short_break_minutes", ConfigValue::Number(5)));
    }
}
