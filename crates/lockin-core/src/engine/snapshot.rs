//! Engine snapshot: the single authoritative description of the current
//! session.
//!
//! In memory the snapshot is a sum type, so an idle engine cannot carry
//! stale session fields. On disk it is a flat [`SnapshotRecord`] with string
//! tags; converting back validates those tags.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SessionError, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Work,
    Break,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Work => "work",
            SessionType::Break => "break",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(SessionType::Work),
            "break" => Ok(SessionType::Break),
            other => Err(SessionError::InvalidSessionType(other.to_string())),
        }
    }
}

/// How a logged session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Abandoned,
    EndedEarly,
}

impl SessionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Abandoned => "abandoned",
            SessionOutcome::EndedEarly => "ended_early",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(SessionOutcome::Completed),
            "abandoned" => Some(SessionOutcome::Abandoned),
            "ended_early" => Some(SessionOutcome::EndedEarly),
            _ => None,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short or long break, as selected by `switch_break`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Short,
    Long,
}

impl BreakKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakKind::Short => "short",
            BreakKind::Long => "long",
        }
    }
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreakKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(BreakKind::Short),
            "long" => Ok(BreakKind::Long),
            other => Err(SessionError::InvalidBreakType(other.to_string())),
        }
    }
}

/// Payload-free view of [`SessionState`], used for display and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    AwaitingDecision,
    RunningBonus,
    Ended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::AwaitingDecision => "awaiting_decision",
            SessionStatus::RunningBonus => "running_bonus",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SessionStatus::Idle),
            "running" => Some(SessionStatus::Running),
            "awaiting_decision" => Some(SessionStatus::AwaitingDecision),
            "running_bonus" => Some(SessionStatus::RunningBonus),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }

    /// Idle and ended both allow a new session to start.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionStatus::Idle | SessionStatus::Ended)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing of the session currently in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub planned_end_time: DateTime<Utc>,
    pub planned_duration_minutes: u32,
}

impl ActiveSession {
    pub fn new(session_type: SessionType, start_time: DateTime<Utc>, planned_minutes: u32) -> Self {
        Self {
            session_type,
            start_time,
            planned_end_time: start_time + Duration::minutes(i64::from(planned_minutes)),
            planned_duration_minutes: planned_minutes,
        }
    }

    /// Fractional minutes since the session started, never negative.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        minutes_between(self.start_time, now)
    }

    pub fn planned_reached(&self, now: DateTime<Utc>) -> bool {
        now >= self.planned_end_time
    }

    /// Move the planned end to `start_time + minutes`.
    pub fn replan(&mut self, minutes: u32) {
        self.planned_end_time = self.start_time + Duration::minutes(i64::from(minutes));
        self.planned_duration_minutes = minutes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running(ActiveSession),
    AwaitingDecision {
        session: ActiveSession,
        decision_window_start: DateTime<Utc>,
    },
    RunningBonus(ActiveSession),
    Ended,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Running(_) => SessionStatus::Running,
            SessionState::AwaitingDecision { .. } => SessionStatus::AwaitingDecision,
            SessionState::RunningBonus(_) => SessionStatus::RunningBonus,
            SessionState::Ended => SessionStatus::Ended,
        }
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        match self {
            SessionState::Running(session)
            | SessionState::AwaitingDecision { session, .. }
            | SessionState::RunningBonus(session) => Some(session),
            SessionState::Idle | SessionState::Ended => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut ActiveSession> {
        match self {
            SessionState::Running(session)
            | SessionState::AwaitingDecision { session, .. }
            | SessionState::RunningBonus(session) => Some(session),
            SessionState::Idle | SessionState::Ended => None,
        }
    }

    pub fn decision_window_start(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::AwaitingDecision {
                decision_window_start,
                ..
            } => Some(*decision_window_start),
            _ => None,
        }
    }
}

/// The engine's singleton state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineSnapshot {
    pub state: SessionState,
    pub last_notification_time: Option<DateTime<Utc>>,
}

impl EngineSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.state.session()
    }

    pub fn session_type(&self) -> Option<SessionType> {
        self.session().map(|s| s.session_type)
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }
}

/// Flat on-disk form of [`EngineSnapshot`].
///
/// Tags are plain strings so that an unrecognized value still deserializes
/// and can be reported as corruption instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub session_state: String,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_duration_minutes: Option<u32>,
    #[serde(default)]
    pub decision_window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_notification_time: Option<DateTime<Utc>>,
}

impl From<&EngineSnapshot> for SnapshotRecord {
    fn from(snapshot: &EngineSnapshot) -> Self {
        let session = snapshot.session();
        Self {
            session_state: snapshot.status().as_str().to_string(),
            session_type: session.map(|s| s.session_type.as_str().to_string()),
            start_time: session.map(|s| s.start_time),
            planned_end_time: session.map(|s| s.planned_end_time),
            planned_duration_minutes: session.map(|s| s.planned_duration_minutes),
            decision_window_start: snapshot.state.decision_window_start(),
            last_notification_time: snapshot.last_notification_time,
        }
    }
}

impl TryFrom<SnapshotRecord> for EngineSnapshot {
    type Error = SnapshotError;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        let status = SessionStatus::parse(&record.session_state)
            .ok_or_else(|| SnapshotError::UnknownState(record.session_state.clone()))?;

        let session_type = match record.session_type.as_deref() {
            None => None,
            Some(raw) => Some(
                raw.parse::<SessionType>()
                    .map_err(|_| SnapshotError::UnknownType(raw.to_string()))?,
            ),
        };

        let missing = |field: &'static str| SnapshotError::MissingField {
            state: record.session_state.clone(),
            field,
        };

        let active = || -> Result<ActiveSession, SnapshotError> {
            Ok(ActiveSession {
                session_type: session_type.ok_or_else(|| missing("session_type"))?,
                start_time: record.start_time.ok_or_else(|| missing("start_time"))?,
                planned_end_time: record
                    .planned_end_time
                    .ok_or_else(|| missing("planned_end_time"))?,
                planned_duration_minutes: record
                    .planned_duration_minutes
                    .ok_or_else(|| missing("planned_duration_minutes"))?,
            })
        };

        let state = match status {
            SessionStatus::Idle => SessionState::Idle,
            SessionStatus::Ended => SessionState::Ended,
            SessionStatus::Running => SessionState::Running(active()?),
            SessionStatus::RunningBonus => SessionState::RunningBonus(active()?),
            SessionStatus::AwaitingDecision => SessionState::AwaitingDecision {
                session: active()?,
                decision_window_start: record
                    .decision_window_start
                    .ok_or_else(|| missing("decision_window_start"))?,
            },
        };

        Ok(Self {
            state,
            last_notification_time: record.last_notification_time,
        })
    }
}

/// Fractional minutes from `from` to `to`, clamped at zero.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let ms = (to - from).num_milliseconds().max(0);
    ms as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn idle_record_has_no_session_fields() {
        let record = SnapshotRecord::from(&EngineSnapshot::idle());
        assert_eq!(record.session_state, "idle");
        assert!(record.session_type.is_none());
        assert!(record.start_time.is_none());
        assert!(record.planned_end_time.is_none());
        assert!(record.planned_duration_minutes.is_none());
        assert!(record.decision_window_start.is_none());
    }

    #[test]
    fn awaiting_decision_survives_record_conversion() {
        let snapshot = EngineSnapshot {
            state: SessionState::AwaitingDecision {
                session: ActiveSession::new(SessionType::Work, t0(), 25),
                decision_window_start: t0() + Duration::minutes(25),
            },
            last_notification_time: Some(t0() + Duration::minutes(25)),
        };
        let record = SnapshotRecord::from(&snapshot);
        assert_eq!(record.session_state, "awaiting_decision");
        assert_eq!(EngineSnapshot::try_from(record).unwrap(), snapshot);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let record = SnapshotRecord {
            session_state: "paused".into(),
            ..Default::default()
        };
        assert_eq!(
            EngineSnapshot::try_from(record),
            Err(SnapshotError::UnknownState("paused".into()))
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut record = SnapshotRecord::from(&EngineSnapshot {
            state: SessionState::Running(ActiveSession::new(SessionType::Break, t0(), 5)),
            last_notification_time: None,
        });
        record.session_type = Some("nap".into());
        assert_eq!(
            EngineSnapshot::try_from(record),
            Err(SnapshotError::UnknownType("nap".into()))
        );
    }

    #[test]
    fn running_without_start_time_is_rejected() {
        let record = SnapshotRecord {
            session_state: "running".into(),
            session_type: Some("work".into()),
            ..Default::default()
        };
        assert!(matches!(
            EngineSnapshot::try_from(record),
            Err(SnapshotError::MissingField { field: "start_time", .. })
        ));
    }

    #[test]
    fn replan_moves_planned_end_from_start() {
        let mut session = ActiveSession::new(SessionType::Break, t0(), 5);
        session.replan(15);
        assert_eq!(session.planned_end_time, t0() + Duration::minutes(15));
        assert_eq!(session.planned_duration_minutes, 15);
    }

    #[test]
    fn elapsed_minutes_is_fractional_and_clamped() {
        let session = ActiveSession::new(SessionType::Work, t0(), 25);
        assert_eq!(session.elapsed_minutes(t0() + Duration::seconds(90)), 1.5);
        assert_eq!(session.elapsed_minutes(t0() - Duration::minutes(1)), 0.0);
    }
}
