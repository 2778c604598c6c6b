//! Integration tests for the engine and command channel.
//!
//! Tests the full round trip from a client enqueueing commands, through an
//! engine step, to the snapshot and history a client reads back.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lockin_core::channel::PollOptions;
use lockin_core::{
    BreakKind, Command, CommandClient, Database, Engine, EngineSnapshot, NoopNotifier,
    SessionOutcome, SessionStatus, SessionType,
};
use std::time::Duration as StdDuration;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

fn mins(n: i64) -> Duration {
    Duration::minutes(n)
}

fn start(session_type: SessionType, duration_minutes: i64) -> Command {
    Command::StartSession {
        session_type,
        duration_minutes,
    }
}

fn quick() -> PollOptions {
    PollOptions {
        timeout: StdDuration::from_millis(200),
        interval: StdDuration::from_millis(20),
    }
}

#[test]
fn test_start_then_quit_applies_in_order() {
    let engine_db = Database::open_memory().unwrap();
    {
        let client = CommandClient::new(&engine_db);
        client.enqueue(&start(SessionType::Work, 25)).unwrap();
        client.enqueue(&Command::QuitSession).unwrap();
    }
    let mut engine = Engine::load(engine_db, NoopNotifier).unwrap();

    assert_eq!(engine.step(t0()).unwrap(), 2);

    // Started, then immediately ended below the log threshold.
    assert_eq!(engine.snapshot(), &EngineSnapshot::idle());
    assert!(engine.database().last_session().unwrap().is_none());
    assert!(engine.database().pending_commands().unwrap().is_empty());
}

#[test]
fn test_quit_then_start_leaves_session_running() {
    let db = Database::open_memory().unwrap();
    {
        let client = CommandClient::new(&db);
        client.enqueue(&Command::QuitSession).unwrap();
        client.enqueue(&start(SessionType::Work, 25)).unwrap();
    }
    let mut engine = Engine::load(db, NoopNotifier).unwrap();
    engine.step(t0()).unwrap();

    assert_eq!(engine.snapshot().status(), SessionStatus::Running);
}

#[test]
fn test_client_observes_engine_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lockin.db");

    let mut engine = Engine::load(Database::open_at(&path).unwrap(), NoopNotifier).unwrap();
    let client_db = Database::open_at(&path).unwrap();
    let client = CommandClient::new(&client_db);

    let ticket = client.enqueue(&start(SessionType::Work, 50)).unwrap();
    let now = Utc::now();
    engine.step(now).unwrap();

    assert!(client.wait_for_processed(&ticket, quick()).unwrap());
    let seen = client
        .wait_for_snapshot(|s| s.status() == SessionStatus::Running, quick())
        .unwrap()
        .expect("engine state visible to client");
    assert_eq!(seen.session_type(), Some(SessionType::Work));
    assert_eq!(seen.session().unwrap().planned_duration_minutes, 50);
    assert!(client.engine_alive(now).unwrap());
}

#[test]
fn test_full_work_session_with_bonus() {
    let mut engine = Engine::load(Database::open_memory().unwrap(), NoopNotifier).unwrap();
    engine.start_session(SessionType::Work, 25, t0()).unwrap();

    engine.step(t0() + mins(24)).unwrap();
    assert_eq!(engine.snapshot().status(), SessionStatus::Running);

    engine.step(t0() + mins(25)).unwrap();
    assert_eq!(engine.snapshot().status(), SessionStatus::AwaitingDecision);

    engine.step(t0() + mins(28)).unwrap();
    assert_eq!(engine.snapshot().status(), SessionStatus::RunningBonus);

    engine.quit_session(t0() + mins(40)).unwrap();
    let logged = engine.database().last_session().unwrap().unwrap();
    assert_eq!(logged.outcome, SessionOutcome::Completed);
    assert!((logged.actual_duration_minutes - 40.0).abs() < 1e-9);
    assert!((logged.bonus_minutes - 15.0).abs() < 1e-9);
    assert_eq!(engine.snapshot(), &EngineSnapshot::idle());
}

#[test]
fn test_break_ends_itself_at_long_break_duration() {
    let mut engine = Engine::load(Database::open_memory().unwrap(), NoopNotifier).unwrap();
    engine.start_session(SessionType::Break, 5, t0()).unwrap();

    for m in [5, 8, 14] {
        engine.step(t0() + mins(m)).unwrap();
    }
    assert_eq!(engine.snapshot().status(), SessionStatus::RunningBonus);

    engine.step(t0() + mins(15)).unwrap();
    assert_eq!(engine.snapshot(), &EngineSnapshot::idle());
    let logged = engine.database().last_session().unwrap().unwrap();
    assert_eq!(logged.session_type, SessionType::Break);
    assert_eq!(logged.outcome, SessionOutcome::Completed);
}

#[test]
fn test_switch_break_through_the_channel() {
    let db = Database::open_memory().unwrap();
    let mut engine = Engine::load(db, NoopNotifier).unwrap();
    engine.start_session(SessionType::Break, 5, t0()).unwrap();

    CommandClient::new(engine.database())
        .enqueue(&Command::SwitchBreak {
            break_type: BreakKind::Long,
        })
        .unwrap();
    engine.step(t0() + mins(4)).unwrap();

    let session = engine.snapshot().session().unwrap().clone();
    assert_eq!(session.planned_duration_minutes, 15);
    assert_eq!(session.planned_end_time, t0() + mins(15));
}

#[test]
fn test_engine_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lockin.db");

    {
        let mut engine = Engine::load(Database::open_at(&path).unwrap(), NoopNotifier).unwrap();
        engine.start_session(SessionType::Work, 25, t0()).unwrap();
    }

    let mut engine = Engine::load(Database::open_at(&path).unwrap(), NoopNotifier).unwrap();
    assert_eq!(engine.snapshot().status(), SessionStatus::Running);

    // Missed the planned end while down; the first step catches up.
    engine.step(t0() + mins(30)).unwrap();
    assert_eq!(engine.snapshot().status(), SessionStatus::AwaitingDecision);
}

#[test]
fn test_bad_commands_are_consumed_without_effect() {
    let db = Database::open_memory().unwrap();
    {
        let client = CommandClient::new(&db);
        client
            .enqueue_raw("start_session", &serde_json::json!({"session_type": "nap"}))
            .unwrap();
        client
            .enqueue_raw("snooze", &serde_json::Value::Null)
            .unwrap();
        client.enqueue(&start(SessionType::Work, 0)).unwrap();
    }
    let mut engine = Engine::load(db, NoopNotifier).unwrap();

    assert_eq!(engine.step(t0()).unwrap(), 3);
    assert_eq!(engine.snapshot(), &EngineSnapshot::idle());
    assert!(engine.database().pending_commands().unwrap().is_empty());
}

#[test]
fn test_concurrent_first_open_migrates_once() {
    use std::sync::{Arc, Barrier};

    for _ in 0..10 {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("lockin.db"));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = Arc::clone(&path);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    Database::open_at(&path).map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert!(db.pending_commands().unwrap().is_empty());
    }
}
