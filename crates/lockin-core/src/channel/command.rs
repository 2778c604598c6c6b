//! Typed commands and their wire form in the command log.

use serde::Deserialize;
use serde_json::json;

use crate::engine::{BreakKind, SessionType};
use crate::storage::CommandRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartSession {
        session_type: SessionType,
        duration_minutes: i64,
    },
    QuitSession,
    ContinueSession,
    SwitchBreak {
        break_type: BreakKind,
    },
}

/// Why a logged command could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Name not recognised; skipped silently.
    UnknownName,
    /// Known name with unusable arguments.
    BadArguments(String),
}

#[derive(Deserialize)]
struct StartArgs {
    session_type: SessionType,
    duration_minutes: i64,
}

#[derive(Deserialize)]
struct SwitchArgs {
    break_type: BreakKind,
}

impl Command {
    pub const START_SESSION: &'static str = "start_session";
    pub const QUIT_SESSION: &'static str = "quit_session";
    pub const CONTINUE_SESSION: &'static str = "continue_session";
    pub const SWITCH_BREAK: &'static str = "switch_break";

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartSession { .. } => Self::START_SESSION,
            Command::QuitSession => Self::QUIT_SESSION,
            Command::ContinueSession => Self::CONTINUE_SESSION,
            Command::SwitchBreak { .. } => Self::SWITCH_BREAK,
        }
    }

    /// JSON arguments as stored in the log; `null` when there are none.
    pub fn arguments(&self) -> serde_json::Value {
        match self {
            Command::StartSession {
                session_type,
                duration_minutes,
            } => json!({
                "session_type": session_type,
                "duration_minutes": duration_minutes,
            }),
            Command::SwitchBreak { break_type } => json!({ "break_type": break_type }),
            Command::QuitSession | Command::ContinueSession => serde_json::Value::Null,
        }
    }

    pub fn decode(name: &str, arguments: &serde_json::Value) -> Result<Self, DecodeError> {
        let bad = |e: serde_json::Error| DecodeError::BadArguments(e.to_string());
        match name {
            Self::START_SESSION => {
                let args: StartArgs = serde_json::from_value(arguments.clone()).map_err(bad)?;
                Ok(Command::StartSession {
                    session_type: args.session_type,
                    duration_minutes: args.duration_minutes,
                })
            }
            Self::QUIT_SESSION => Ok(Command::QuitSession),
            Self::CONTINUE_SESSION => Ok(Command::ContinueSession),
            Self::SWITCH_BREAK => {
                let args: SwitchArgs = serde_json::from_value(arguments.clone()).map_err(bad)?;
                Ok(Command::SwitchBreak {
                    break_type: args.break_type,
                })
            }
            _ => Err(DecodeError::UnknownName),
        }
    }
}

impl TryFrom<&CommandRecord> for Command {
    type Error = DecodeError;

    fn try_from(record: &CommandRecord) -> Result<Self, Self::Error> {
        Command::decode(&record.name, &record.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_session_wire_form() {
        let cmd = Command::StartSession {
            session_type: SessionType::Break,
            duration_minutes: 5,
        };
        assert_eq!(cmd.name(), "start_session");
        assert_eq!(
            cmd.arguments(),
            json!({"session_type": "break", "duration_minutes": 5})
        );
        assert_eq!(Command::decode(cmd.name(), &cmd.arguments()), Ok(cmd));
    }

    #[test]
    fn argumentless_commands_ignore_payload() {
        assert_eq!(
            Command::decode("quit_session", &serde_json::Value::Null),
            Ok(Command::QuitSession)
        );
        assert_eq!(
            Command::decode("continue_session", &json!({"extra": true})),
            Ok(Command::ContinueSession)
        );
    }

    #[test]
    fn unknown_name_is_distinguished_from_bad_arguments() {
        assert_eq!(
            Command::decode("pause_session", &serde_json::Value::Null),
            Err(DecodeError::UnknownName)
        );
        assert!(matches!(
            Command::decode("switch_break", &json!({"break_type": "medium"})),
            Err(DecodeError::BadArguments(_))
        ));
        assert!(matches!(
            Command::decode("start_session", &serde_json::Value::Null),
            Err(DecodeError::BadArguments(_))
        ));
    }
}
