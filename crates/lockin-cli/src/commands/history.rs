use clap::{Args, Subcommand};
use lockin_core::{Database, SessionType};

use super::{local, CliResult};

#[derive(Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    action: Option<HistoryAction>,
    /// Number of sessions to show
    #[arg(long, default_value_t = 10)]
    limit: usize,
    /// Only show "work" or "break" sessions
    #[arg(long = "type")]
    session_type: Option<SessionType>,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Delete a session from history
    Delete {
        /// Session ID
        id: i64,
    },
}

pub fn run(args: HistoryArgs) -> CliResult {
    let db = Database::open()?;

    if let Some(HistoryAction::Delete { id }) = args.action {
        if !db.delete_session(id)? {
            return Err(format!("no session with id {id}").into());
        }
        println!("Deleted session {id}");
        return Ok(());
    }

    let sessions = db.recent_sessions(args.limit, args.session_type)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions yet");
        return Ok(());
    }

    println!("{:>5}  {:<16}  {:<5}  {:<11}  {:>7}  {:>7}", "ID", "Started", "Type", "Outcome", "Minutes", "Bonus");
    for s in &sessions {
        println!(
            "{:>5}  {:<16}  {:<5}  {:<11}  {:>7.1}  {:>7.1}",
            s.id,
            local(s.start_time),
            s.session_type.as_str(),
            s.outcome.as_str(),
            s.actual_duration_minutes,
            s.bonus_minutes
        );
    }
    Ok(())
}
