//! Property tests for the session state machine.

use chrono::{Duration, TimeZone, Utc};
use lockin_core::storage::Settings;
use lockin_core::{EngineSnapshot, SessionMachine, SessionStatus, SessionType};
use proptest::prelude::*;

fn session_type() -> impl Strategy<Value = SessionType> {
    prop_oneof![Just(SessionType::Work), Just(SessionType::Break)]
}

proptest! {
    #[test]
    fn start_accepts_every_duration_up_to_a_day(d in 1i64..=1440, st in session_type(), offset in 0i64..1_000_000) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset);
        let mut machine = SessionMachine::default();

        prop_assert!(machine.start_session(st, d, now).is_ok());
        let session = machine.snapshot().session().cloned().unwrap();
        prop_assert_eq!(machine.snapshot().status(), SessionStatus::Running);
        prop_assert_eq!(session.start_time, now);
        prop_assert_eq!(session.planned_end_time, now + Duration::seconds(60 * d));
    }

    #[test]
    fn start_rejects_out_of_range_durations(
        d in prop_oneof![i64::MIN..=0, 1441i64..=i64::MAX],
        st in session_type(),
    ) {
        let now = Utc::now();
        let mut machine = SessionMachine::default();

        prop_assert!(machine.start_session(st, d, now).is_err());
        prop_assert_eq!(machine.snapshot(), &EngineSnapshot::idle());
    }

    #[test]
    fn start_never_replaces_an_active_session(d in 1i64..=1440, elapsed in 0i64..3000) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let settings = Settings::default();
        let mut machine = SessionMachine::default();
        machine.start_session(SessionType::Work, 25, t0).unwrap();
        // Drive into whichever active state the elapsed time reaches.
        for m in (0..=elapsed).step_by(60) {
            machine.tick(t0 + Duration::seconds(m), &settings);
        }
        let before = machine.snapshot().clone();

        prop_assert!(machine.start_session(SessionType::Break, d, t0 + Duration::seconds(elapsed)).is_err());
        prop_assert_eq!(machine.snapshot(), &before);
    }
}
