//! Cross-process command channel.
//!
//! Clients append [`Command`]s to the log in the database; the engine drains
//! them in enqueue order once per step. Nothing flows back except the
//! processed flag and the snapshot, so clients observe effects by polling
//! (see [`CommandClient`]).

mod client;
mod command;

pub use client::{CommandClient, PollOptions, HEARTBEAT_TIMEOUT_SECS};
pub use command::{Command, DecodeError};
