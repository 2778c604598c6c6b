use chrono::{DateTime, Utc};
use clap::Subcommand;
use lockin_core::channel::PollOptions;
use lockin_core::engine::{minutes_between, SnapshotRecord};
use lockin_core::stats;
use lockin_core::{
    BreakKind, Command, CommandClient, Config, Database, EngineSnapshot, SessionError,
    SessionMachine, SessionState, SessionType, Settings,
};
use std::io::Write;
use std::time::Duration;

use super::{clock, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a work session
    Start {
        /// Planned length in minutes
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
    },
    /// Start a break
    Break {
        /// "short", "long" or a number of minutes (default: recommended)
        kind: Option<String>,
    },
    /// End the current session
    Quit,
    /// Keep going past the planned time
    Continue,
    /// Switch the running break between short and long
    Switch {
        /// "short" or "long"
        kind: BreakKind,
    },
    /// Show the current session
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow the current session until it ends (Ctrl-C detaches)
    Attach,
    /// Recommend the next break length
    Recommend,
}

pub fn run(action: SessionAction) -> CliResult {
    let db = Database::open()?;
    let settings = Config::new(&db).settings()?;

    match action {
        SessionAction::Start { minutes } => {
            let command = Command::StartSession {
                session_type: SessionType::Work,
                duration_minutes: minutes,
            };
            if submit(&db, &settings, command)? && settings.auto_attach {
                attach(&db, &settings)?;
            }
        }
        SessionAction::Break { kind } => {
            let minutes = break_length(&db, &settings, kind.as_deref())?;
            let command = Command::StartSession {
                session_type: SessionType::Break,
                duration_minutes: minutes,
            };
            if submit(&db, &settings, command)? && settings.auto_attach {
                attach(&db, &settings)?;
            }
        }
        SessionAction::Quit => {
            submit(&db, &settings, Command::QuitSession)?;
        }
        SessionAction::Continue => {
            submit(&db, &settings, Command::ContinueSession)?;
        }
        SessionAction::Switch { kind } => {
            submit(&db, &settings, Command::SwitchBreak { break_type: kind })?;
        }
        SessionAction::Status { json } => status(&db, &settings, json)?,
        SessionAction::Attach => attach(&db, &settings)?,
        SessionAction::Recommend => {
            let streak = stats::current_streak(&db, Utc::now())?;
            let kind = stats::recommended_break(streak, &settings);
            println!(
                "Recommended: {kind} break ({} min), streak {streak}",
                settings.break_minutes(kind)
            );
        }
    }
    Ok(())
}

fn break_length(db: &Database, settings: &Settings, arg: Option<&str>) -> Result<i64, Box<dyn std::error::Error>> {
    let kind = match arg {
        None => stats::recommended_break(stats::current_streak(db, Utc::now())?, settings),
        Some(raw) => match raw.parse::<BreakKind>() {
            Ok(kind) => kind,
            Err(_) => {
                let minutes = raw
                    .parse::<i64>()
                    .map_err(|_| SessionError::InvalidBreakType(raw.to_string()))?;
                return Ok(minutes);
            }
        },
    };
    Ok(i64::from(settings.break_minutes(kind)))
}

/// Check `command` against the current snapshot, enqueue it, and wait for
/// the engine. Returns whether the engine applied it.
fn submit(db: &Database, settings: &Settings, command: Command) -> Result<bool, Box<dyn std::error::Error>> {
    let client = CommandClient::new(db);

    // Rejections surface here without a round trip through the engine.
    let mut preview = SessionMachine::new(client.current_state()?);
    let expected = preview.apply(command.clone(), Utc::now(), settings)?;

    let ticket = client.enqueue(&command)?;
    if !client.wait_for_processed(&ticket, PollOptions::default())? {
        println!("Command queued, but the engine has not picked it up. Is `lockin-engine` running?");
        return Ok(false);
    }

    let actual = client.current_state()?;
    if applied_as_expected(preview.snapshot(), &actual) {
        println!("{}", expected.message);
        Ok(true)
    } else {
        println!(
            "The engine did not apply {}; the session is now {}.",
            command.name(),
            actual.status()
        );
        Ok(false)
    }
}

/// Whether the engine's snapshot matches the locally previewed one. Times
/// differ between the two clocks, so only the session shape is compared.
fn applied_as_expected(expected: &EngineSnapshot, actual: &EngineSnapshot) -> bool {
    let shape = |s: &EngineSnapshot| {
        (
            s.status(),
            s.session()
                .map(|session| (session.session_type, session.planned_duration_minutes)),
        )
    };
    shape(expected) == shape(actual)
}

fn status(db: &Database, settings: &Settings, json: bool) -> CliResult {
    let client = CommandClient::new(db);
    let now = Utc::now();
    let alive = client.engine_alive(now)?;
    let snapshot = client.current_state()?;
    let today = stats::todays_stats(db, now)?;
    let streak = stats::current_streak(db, now)?;

    if json {
        let value = serde_json::json!({
            "engine_alive": alive,
            "snapshot": SnapshotRecord::from(&snapshot),
            "streak": streak,
            "today": today,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", describe(&snapshot, settings, now));
    if !alive {
        println!("Engine: not running (start it with `lockin-engine`)");
    }
    println!(
        "Today: {:.0} min work ({} completed), {:.0} min break, streak {streak}",
        today.total_work_minutes, today.work_completed, today.total_break_minutes
    );
    Ok(())
}

fn attach(db: &Database, settings: &Settings) -> CliResult {
    let client = CommandClient::new(db);
    if !client.current_state()?.is_active() {
        println!("No active session");
        return Ok(());
    }
    println!("Attached. Ctrl-C detaches; the session keeps running.");

    let mut stdout = std::io::stdout();
    loop {
        let snapshot = client.current_state()?;
        if !snapshot.is_active() {
            println!("\nSession ended.");
            return Ok(());
        }
        let line = describe(&snapshot, settings, Utc::now());
        write!(stdout, "\r\x1b[2K{}", line.lines().next().unwrap_or_default())?;
        stdout.flush()?;
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// Human-readable summary of `snapshot` at `now`.
pub(crate) fn describe(snapshot: &EngineSnapshot, settings: &Settings, now: DateTime<Utc>) -> String {
    match &snapshot.state {
        SessionState::Idle | SessionState::Ended => "No active session".to_string(),
        SessionState::Running(s) => {
            let elapsed = s.elapsed_minutes(now);
            let remaining = minutes_between(now, s.planned_end_time);
            format!(
                "{} session: {} elapsed, {} remaining of {} min",
                s.session_type,
                clock(elapsed),
                clock(remaining),
                s.planned_duration_minutes
            )
        }
        SessionState::AwaitingDecision {
            session: s,
            decision_window_start,
        } => {
            let left = f64::from(settings.decision_window_minutes)
                - minutes_between(*decision_window_start, now);
            let next = if settings.default_to_overtime {
                "continuing into overtime in"
            } else {
                "overtime starts unless you quit within"
            };
            format!(
                "{} session complete ({} min): `lockin quit` to finish, `lockin continue` to keep going; {next} {}",
                s.session_type,
                s.planned_duration_minutes,
                clock(left)
            )
        }
        SessionState::RunningBonus(s) => {
            let bonus = s.elapsed_minutes(now) - f64::from(s.planned_duration_minutes);
            let mut out = format!(
                "{} overtime: +{} past {} min",
                s.session_type,
                clock(bonus),
                s.planned_duration_minutes
            );
            match s.session_type {
                SessionType::Break => {
                    out.push_str(&format!(" (ends at {} min)", settings.long_break_minutes));
                }
                SessionType::Work
                    if settings.overtime_max_minutes > 0
                        && bonus > f64::from(settings.overtime_max_minutes) =>
                {
                    out.push_str(&format!(
                        "\nOver the {} minute overtime budget; `lockin quit` to wrap up",
                        settings.overtime_max_minutes
                    ));
                }
                SessionType::Work => {}
            }
            out
        }
    }
}
