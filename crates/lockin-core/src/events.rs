use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{BreakKind, SessionOutcome, SessionType};

/// Every state change in the engine produces an Event.
/// The engine logs them; the decision-window event also drives the
/// desktop notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        session_type: SessionType,
        planned_minutes: u32,
        at: DateTime<Utc>,
    },
    /// Planned time elapsed; the user may now end or extend the session.
    DecisionWindowOpened {
        session_type: SessionType,
        planned_minutes: u32,
        at: DateTime<Utc>,
    },
    /// Time past the planned end now counts as bonus.
    BonusStarted {
        session_type: SessionType,
        /// True when the decision window ran out rather than the user
        /// choosing to continue.
        automatic: bool,
        at: DateTime<Utc>,
    },
    BreakSwitched {
        break_kind: BreakKind,
        planned_minutes: u32,
        planned_end_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Session ended and was written to history.
    SessionLogged {
        session_type: SessionType,
        outcome: SessionOutcome,
        actual_minutes: f64,
        bonus_minutes: f64,
        at: DateTime<Utc>,
    },
    /// Session ended below the logging threshold and was discarded.
    SessionScrapped {
        session_type: SessionType,
        actual_minutes: f64,
        at: DateTime<Utc>,
    },
    /// Quit from a state that held no session.
    SessionEnded {
        at: DateTime<Utc>,
    },
}
