//! # Lockin Core Library
//!
//! This library provides the core logic for Lockin, a focus-session timer.
//! A single long-running engine process owns the session state; any number
//! of short-lived client processes read its snapshot and ask it to act by
//! appending commands to a shared SQLite database.
//!
//! ## Architecture
//!
//! - **Engine**: A wall-clock state machine for one work or break session,
//!   driven by a caller that invokes `step()` once per second
//! - **Command channel**: An append-only command log the engine drains in
//!   order, with bounded client-side polling for the effect
//! - **Storage**: SQLite session history, engine snapshot and validated
//!   config overrides
//! - **Statistics**: Streaks, today's totals and period reports
//!
//! ## Key Components
//!
//! - [`Engine`]: Engine driver around [`SessionMachine`]
//! - [`CommandClient`]: Client-side enqueue and polling
//! - [`Database`]: Shared persistence
//! - [`Config`]: Typed settings with defaults and validation

pub mod channel;
pub mod engine;
pub mod error;
pub mod events;
pub mod stats;
pub mod storage;

pub use channel::{Command, CommandClient, PollOptions};
pub use engine::{
    BreakKind, DesktopNotifier, Engine, EngineSnapshot, NoopNotifier, Notifier, SessionMachine,
    SessionOutcome, SessionState, SessionStatus, SessionType, Transition,
};
pub use error::{ConfigError, CoreError, DatabaseError, PeriodError, SessionError, SnapshotError};
pub use events::Event;
pub use storage::{Config, ConfigValue, Database, SessionRecord, Settings};
