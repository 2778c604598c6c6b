//! Client side of the command channel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::{Duration, Instant};

use super::Command;
use crate::engine::EngineSnapshot;
use crate::error::CoreError;
use crate::storage::{CommandTicket, Database, StoredSnapshot};

/// A snapshot written within this many seconds means an engine is running.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 5;

/// Bounds for a poll-until-observed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            interval: Duration::from_millis(100),
        }
    }
}

pub struct CommandClient<'a> {
    db: &'a Database,
}

impl<'a> CommandClient<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// The latest persisted snapshot and its heartbeat, if any.
    pub fn snapshot(&self) -> Result<Option<StoredSnapshot>, CoreError> {
        Ok(self.db.load_snapshot()?)
    }

    /// The latest snapshot, idle when the engine never wrote one.
    pub fn current_state(&self) -> Result<EngineSnapshot, CoreError> {
        Ok(self
            .snapshot()?
            .map(|stored| stored.snapshot)
            .unwrap_or_default())
    }

    pub fn engine_alive(&self, now: DateTime<Utc>) -> Result<bool, CoreError> {
        Ok(self
            .snapshot()?
            .is_some_and(|stored| is_fresh(stored.updated_at, now)))
    }

    pub fn enqueue(&self, command: &Command) -> Result<CommandTicket, CoreError> {
        self.enqueue_raw(command.name(), &command.arguments())
    }

    /// Append a command by name. The engine ignores names it does not know.
    pub fn enqueue_raw(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<CommandTicket, CoreError> {
        let ticket = self.db.enqueue_command(name, arguments, Utc::now())?;
        tracing::debug!(id = ticket.id, correlation_id = %ticket.correlation_id, command = name, "enqueued");
        Ok(ticket)
    }

    /// Poll until the engine marks `ticket` processed.
    ///
    /// Returns `false` on timeout, or when the row is gone.
    pub fn wait_for_processed(
        &self,
        ticket: &CommandTicket,
        options: PollOptions,
    ) -> Result<bool, CoreError> {
        poll(options, || {
            let done = self
                .db
                .command(ticket.id)?
                .is_some_and(|c| c.processed && c.correlation_id == Some(ticket.correlation_id));
            Ok(done.then_some(()))
        })
        .map(|seen| seen.is_some())
    }

    /// Poll the snapshot until `predicate` holds; returns the matching
    /// snapshot, or `None` on timeout.
    pub fn wait_for_snapshot<F>(
        &self,
        predicate: F,
        options: PollOptions,
    ) -> Result<Option<EngineSnapshot>, CoreError>
    where
        F: Fn(&EngineSnapshot) -> bool,
    {
        poll(options, || {
            let snapshot = self.current_state()?;
            Ok(predicate(&snapshot).then_some(snapshot))
        })
    }
}

fn is_fresh(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at <= ChronoDuration::seconds(HEARTBEAT_TIMEOUT_SECS)
}

/// Run `check` until it yields a value or the timeout passes. Always
/// checks at least once.
fn poll<T>(
    options: PollOptions,
    mut check: impl FnMut() -> Result<Option<T>, CoreError>,
) -> Result<Option<T>, CoreError> {
    let deadline = Instant::now() + options.timeout;
    loop {
        if let Some(found) = check()? {
            return Ok(Some(found));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(options.interval.min(deadline - now));
    }
}
