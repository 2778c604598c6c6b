//! The session engine.
//!
//! [`SessionMachine`] holds the rules; [`Engine`] owns one machine together
//! with the database and a notifier, and is what the daemon drives. It does
//! not use internal threads - the caller is responsible for calling
//! [`Engine::step`] periodically.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = Engine::load(Database::open()?, DesktopNotifier)?;
//! // Once per second:
//! engine.step(Utc::now())?;
//! ```

mod machine;
mod notify;
mod snapshot;

pub use machine::{SessionMachine, Transition};
pub use notify::{DesktopNotifier, NoopNotifier, Notifier};
pub use snapshot::{
    minutes_between, ActiveSession, BreakKind, EngineSnapshot, SessionOutcome, SessionState,
    SessionStatus, SessionType, SnapshotRecord,
};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};

use crate::channel::{Command, DecodeError};
use crate::error::{CoreError, SessionError};
use crate::events::Event;
use crate::stats;
use crate::storage::{Config, Database, Settings};

/// Processed commands older than this are pruned.
pub const COMMAND_RETENTION_DAYS: i64 = 7;

pub struct Engine<N: Notifier = DesktopNotifier> {
    db: Database,
    machine: SessionMachine,
    settings: Settings,
    notifier: N,
    /// Local day of the last command cleanup.
    cleaned_on: Option<NaiveDate>,
}

impl<N: Notifier> Engine<N> {
    /// Resume from the persisted snapshot, or start idle.
    pub fn load(db: Database, notifier: N) -> Result<Self, CoreError> {
        let snapshot = db
            .load_snapshot()?
            .map(|stored| stored.snapshot)
            .unwrap_or_default();
        let settings = Config::new(&db).settings()?;
        tracing::info!(state = %snapshot.status(), "engine loaded");
        Ok(Self {
            db,
            machine: SessionMachine::new(snapshot),
            settings,
            notifier,
            cleaned_on: None,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> &EngineSnapshot {
        self.machine.snapshot()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// `Long` when today's streak is a positive multiple of
    /// `long_break_every`, otherwise `Short`.
    pub fn recommended_break(&self, now: DateTime<Utc>) -> Result<BreakKind, CoreError> {
        let streak = stats::current_streak(&self.db, now)?;
        Ok(stats::recommended_break(streak, &self.settings))
    }

    // ── Operations ───────────────────────────────────────────────────

    pub fn start_session(
        &mut self,
        session_type: SessionType,
        planned_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        self.run(now, |machine, _| {
            machine.start_session(session_type, planned_minutes, now)
        })
    }

    pub fn quit_session(&mut self, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        self.run(now, |machine, settings| machine.quit_session(now, settings))
    }

    pub fn continue_session(&mut self, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        self.run(now, |machine, _| machine.continue_session(now))
    }

    pub fn switch_break_type(
        &mut self,
        kind: BreakKind,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        self.run(now, |machine, settings| {
            machine.switch_break_type(kind, now, settings)
        })
    }

    /// Apply one decoded command.
    pub fn apply(&mut self, command: Command, now: DateTime<Utc>) -> Result<Transition, CoreError> {
        self.run(now, |machine, settings| machine.apply(command, now, settings))
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// One engine tick: reload settings, run time-driven transitions, apply
    /// pending commands, then persist the snapshot.
    ///
    /// Returns the number of commands drained.
    pub fn step(&mut self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        self.settings = Config::new(&self.db).settings()?;
        self.cleanup_on_new_day(now)?;

        let mut next = self.machine.clone();
        if let Some(transition) = next.tick(now, &self.settings) {
            self.commit(next, transition, now)?;
        }
        let drained = self.drain_commands(now)?;

        self.db.save_snapshot(self.machine.snapshot(), now)?;
        Ok(drained)
    }

    /// Apply every pending command in enqueue order.
    ///
    /// Each command is marked processed once the engine has decided on it.
    /// Rejected and malformed commands are logged and never retried. A
    /// storage failure stops the drain and leaves the command pending for
    /// the next step.
    pub fn drain_commands(&mut self, now: DateTime<Utc>) -> Result<usize, CoreError> {
        let pending = self.db.pending_commands()?;
        let count = pending.len();

        for record in pending {
            match Command::try_from(&record) {
                Ok(command) => {
                    let name = command.name();
                    match self.apply(command, now) {
                        Ok(transition) => {
                            tracing::debug!(id = record.id, command = name, "{}", transition.message);
                        }
                        Err(CoreError::Session(reason)) => {
                            tracing::info!(id = record.id, command = name, %reason, "command rejected");
                        }
                        Err(e) => {
                            tracing::warn!(id = record.id, command = name, error = %e, "command failed");
                            return Err(e);
                        }
                    }
                }
                Err(DecodeError::UnknownName) => {
                    tracing::trace!(id = record.id, command = %record.name, "ignoring unknown command");
                }
                Err(DecodeError::BadArguments(message)) => {
                    tracing::warn!(id = record.id, command = %record.name, %message, "malformed command arguments");
                }
            }
            self.db.mark_command_processed(record.id, now)?;
        }

        Ok(count)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Run `op` against a copy of the machine and commit the result.
    fn run<F>(&mut self, now: DateTime<Utc>, op: F) -> Result<Transition, CoreError>
    where
        F: FnOnce(&mut SessionMachine, &Settings) -> Result<Transition, SessionError>,
    {
        let mut next = self.machine.clone();
        let transition = op(&mut next, &self.settings)?;
        self.commit(next, transition, now)
    }

    /// Adopt `next` only after its history row is written, so a failed
    /// write leaves the session where it was.
    fn commit(
        &mut self,
        next: SessionMachine,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        if let Some(session) = &transition.logged {
            self.db.log_session(session)?;
        }
        self.machine = next;
        for event in &transition.events {
            self.on_event(event, now);
        }
        self.db.save_snapshot(self.machine.snapshot(), now)?;
        Ok(transition)
    }

    fn on_event(&mut self, event: &Event, now: DateTime<Utc>) {
        match event {
            Event::DecisionWindowOpened {
                session_type,
                planned_minutes,
                ..
            } => {
                tracing::info!(%session_type, planned_minutes, "planned time reached");
                self.notifier.notify(
                    &format!("Lockin - {session_type} complete"),
                    &format!(
                        "Your {planned_minutes} minute {session_type} session is complete!"
                    ),
                );
                self.machine.mark_notified(now);
            }
            Event::SessionStarted {
                session_type,
                planned_minutes,
                ..
            } => tracing::info!(%session_type, planned_minutes, "session started"),
            Event::SessionLogged {
                session_type,
                outcome,
                actual_minutes,
                bonus_minutes,
                ..
            } => tracing::info!(
                %session_type,
                %outcome,
                actual_minutes,
                bonus_minutes,
                "session logged"
            ),
            Event::SessionScrapped {
                session_type,
                actual_minutes,
                ..
            } => tracing::info!(%session_type, actual_minutes, "session scrapped"),
            other => tracing::debug!(event = ?other, "transition"),
        }
    }

    fn cleanup_on_new_day(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        let today = now.with_timezone(&Local).date_naive();
        if self.cleaned_on == Some(today) {
            return Ok(());
        }
        let removed = self
            .db
            .cleanup_old_commands(now - Duration::days(COMMAND_RETENTION_DAYS))?;
        if removed > 0 {
            tracing::debug!(removed, "pruned processed commands");
        }
        self.cleaned_on = Some(today);
        Ok(())
    }
}
