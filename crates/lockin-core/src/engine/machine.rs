//! Session state machine.
//!
//! Pure over its inputs: every operation takes the current time and the
//! resolved [`Settings`], mutates the owned [`EngineSnapshot`], and returns
//! what happened. Persisting the snapshot, writing history, and notifying
//! are left to [`super::Engine`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle/Ended --start--> Running --planned end--> AwaitingDecision
//! AwaitingDecision --continue | window elapsed--> RunningBonus
//! RunningBonus (break) --long break elapsed--> Idle
//! any active --quit--> Idle
//! ```

use chrono::{DateTime, Duration, Utc};

use super::snapshot::{
    minutes_between, ActiveSession, BreakKind, EngineSnapshot, SessionOutcome, SessionState,
    SessionType,
};
use crate::channel::Command;
use crate::error::SessionError;
use crate::events::Event;
use crate::storage::{NewSession, Settings, MAX_MINUTES};

/// Result of an accepted operation or a tick that changed state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Human-readable summary for whoever asked.
    pub message: String,
    pub events: Vec<Event>,
    /// History record to append, if the session ended and qualifies.
    pub logged: Option<NewSession>,
}

impl Transition {
    fn new(message: impl Into<String>, event: Event) -> Self {
        Self {
            message: message.into(),
            events: vec![event],
            logged: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    snapshot: EngineSnapshot,
}

impl SessionMachine {
    pub fn new(snapshot: EngineSnapshot) -> Self {
        Self { snapshot }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> &EngineSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &SessionState {
        &self.snapshot.state
    }

    // ── Operations ───────────────────────────────────────────────────

    pub fn start_session(
        &mut self,
        session_type: SessionType,
        planned_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, SessionError> {
        if self.snapshot.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        if planned_minutes <= 0 {
            return Err(SessionError::NonPositiveDuration);
        }
        if planned_minutes > i64::from(MAX_MINUTES) {
            return Err(SessionError::DurationTooLong);
        }
        let planned_minutes = planned_minutes as u32;

        self.snapshot = EngineSnapshot {
            state: SessionState::Running(ActiveSession::new(session_type, now, planned_minutes)),
            last_notification_time: None,
        };

        Ok(Transition::new(
            format!("Started {session_type} session for {planned_minutes} minutes"),
            Event::SessionStarted {
                session_type,
                planned_minutes,
                at: now,
            },
        ))
    }

    pub fn quit_session(
        &mut self,
        now: DateTime<Utc>,
        settings: &Settings,
    ) -> Result<Transition, SessionError> {
        let state = std::mem::take(&mut self.snapshot).state;

        let (session, planned_phase_over) = match state {
            SessionState::Idle => return Err(SessionError::NoActiveSession),
            SessionState::Ended => {
                return Ok(Transition::new("Session ended", Event::SessionEnded { at: now }));
            }
            SessionState::Running(session) => (session, false),
            SessionState::AwaitingDecision { session, .. } | SessionState::RunningBonus(session) => {
                (session, true)
            }
        };

        let actual = session.elapsed_minutes(now);
        let planned = f64::from(session.planned_duration_minutes);
        let bonus = (actual - planned).max(0.0);

        let outcome = if planned_phase_over {
            Some(SessionOutcome::Completed)
        } else if actual >= f64::from(log_threshold(session.session_type, settings)) {
            // The tick may not have caught up with the planned end yet.
            if session.planned_reached(now) {
                Some(SessionOutcome::Completed)
            } else {
                Some(match session.session_type {
                    SessionType::Work => SessionOutcome::Abandoned,
                    SessionType::Break => SessionOutcome::EndedEarly,
                })
            }
        } else {
            None
        };

        let Some(outcome) = outcome else {
            return Ok(Transition::new(
                "Session ended (too short to log)",
                Event::SessionScrapped {
                    session_type: session.session_type,
                    actual_minutes: actual,
                    at: now,
                },
            ));
        };

        let bonus = if outcome == SessionOutcome::Completed {
            bonus
        } else {
            0.0
        };

        Ok(Transition {
            message: format!("Session ended ({outcome})"),
            events: vec![Event::SessionLogged {
                session_type: session.session_type,
                outcome,
                actual_minutes: actual,
                bonus_minutes: bonus,
                at: now,
            }],
            logged: Some(NewSession {
                session_type: session.session_type,
                outcome,
                start_time: session.start_time,
                end_time: now,
                planned_duration_minutes: session.planned_duration_minutes,
                actual_duration_minutes: actual,
                bonus_minutes: bonus,
            }),
        })
    }

    pub fn continue_session(&mut self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        let SessionState::AwaitingDecision { session, .. } = &self.snapshot.state else {
            return Err(SessionError::NotAwaitingDecision);
        };
        let session = session.clone();
        let session_type = session.session_type;
        self.snapshot.state = SessionState::RunningBonus(session);

        Ok(Transition::new(
            "Continuing session",
            Event::BonusStarted {
                session_type,
                automatic: false,
                at: now,
            },
        ))
    }

    pub fn switch_break_type(
        &mut self,
        kind: BreakKind,
        now: DateTime<Utc>,
        settings: &Settings,
    ) -> Result<Transition, SessionError> {
        if self.snapshot.session_type() != Some(SessionType::Break) {
            return Err(SessionError::NotABreak);
        }
        let session = match &mut self.snapshot.state {
            SessionState::Running(session) | SessionState::RunningBonus(session) => session,
            _ => return Err(SessionError::BreakNotRunning),
        };

        let elapsed = session.elapsed_minutes(now);
        let new_duration = settings.break_minutes(kind);
        if elapsed >= f64::from(new_duration) {
            return Err(match kind {
                BreakKind::Short => SessionError::TooLateForShortBreak,
                BreakKind::Long => SessionError::LongBreakElapsed,
            });
        }

        session.replan(new_duration);
        let planned_end_time = session.planned_end_time;

        Ok(Transition::new(
            format!("Switched to {kind} break"),
            Event::BreakSwitched {
                break_kind: kind,
                planned_minutes: new_duration,
                planned_end_time,
                at: now,
            },
        ))
    }

    /// Evaluate time-driven transitions. At most one transition per call.
    pub fn tick(&mut self, now: DateTime<Utc>, settings: &Settings) -> Option<Transition> {
        match &self.snapshot.state {
            SessionState::Running(session) if session.planned_reached(now) => {
                let session = session.clone();
                let event = Event::DecisionWindowOpened {
                    session_type: session.session_type,
                    planned_minutes: session.planned_duration_minutes,
                    at: now,
                };
                self.snapshot.state = SessionState::AwaitingDecision {
                    session,
                    decision_window_start: now,
                };
                Some(Transition::new("Planned time reached", event))
            }
            SessionState::AwaitingDecision {
                session,
                decision_window_start,
            } => {
                let window = Duration::minutes(i64::from(settings.decision_window_minutes));
                if now - *decision_window_start < window {
                    return None;
                }
                let session = session.clone();
                let session_type = session.session_type;
                self.snapshot.state = SessionState::RunningBonus(session);
                Some(Transition::new(
                    "Decision window elapsed",
                    Event::BonusStarted {
                        session_type,
                        automatic: true,
                        at: now,
                    },
                ))
            }
            SessionState::RunningBonus(session)
                if session.session_type == SessionType::Break
                    && minutes_between(session.start_time, now)
                        >= f64::from(settings.long_break_minutes) =>
            {
                self.quit_session(now, settings).ok()
            }
            _ => None,
        }
    }

    /// Run the operation a channel command names.
    pub fn apply(
        &mut self,
        command: Command,
        now: DateTime<Utc>,
        settings: &Settings,
    ) -> Result<Transition, SessionError> {
        match command {
            Command::StartSession {
                session_type,
                duration_minutes,
            } => self.start_session(session_type, duration_minutes, now),
            Command::QuitSession => self.quit_session(now, settings),
            Command::ContinueSession => self.continue_session(now),
            Command::SwitchBreak { break_type } => self.switch_break_type(break_type, now, settings),
        }
    }

    pub fn mark_notified(&mut self, at: DateTime<Utc>) {
        self.snapshot.last_notification_time = Some(at);
    }
}

/// Minimum minutes a session must run before quitting it is logged.
fn log_threshold(session_type: SessionType, settings: &Settings) -> u32 {
    match session_type {
        SessionType::Work => settings.abandon_threshold_minutes,
        SessionType::Break => settings.break_scrap_threshold_minutes,
    }
}
