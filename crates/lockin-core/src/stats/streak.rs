//! Today's streak and totals.
//!
//! "Today" is the local calendar day containing `now`; sessions belong to
//! the day they started in.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{BreakKind, SessionOutcome, SessionType};
use crate::error::DatabaseError;
use crate::storage::{Database, SessionRecord, Settings};

/// Completed work sessions ending less than this apart extend the streak.
pub const STREAK_GAP_MINUTES: i64 = 60;

/// UTC instant of local midnight starting `date`.
///
/// When midnight is skipped by a DST change the date is read as UTC.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Half-open `[start, end)` bounds of the local day containing `now`.
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.with_timezone(&Local).date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    (local_midnight(today), local_midnight(tomorrow))
}

/// Streak length for completed work sessions, given their end times in
/// ascending order.
///
/// Starts at 1 with the first session; each later session either extends
/// the streak (gap strictly under [`STREAK_GAP_MINUTES`]) or starts a new
/// one at 1.
pub fn streak_from_end_times(end_times: &[DateTime<Utc>]) -> u32 {
    let gap = Duration::minutes(STREAK_GAP_MINUTES);
    let mut streak = 0;
    let mut previous: Option<DateTime<Utc>> = None;

    for &end in end_times {
        streak = match previous {
            Some(prev) if end - prev < gap => streak + 1,
            _ => 1,
        };
        previous = Some(end);
    }
    streak
}

/// Current streak of completed work sessions started today.
pub fn current_streak(db: &Database, now: DateTime<Utc>) -> Result<u32, DatabaseError> {
    let (start, end) = day_bounds(now);
    let mut end_times: Vec<_> = db
        .sessions_in_range(start, end)?
        .into_iter()
        .filter(|s| s.session_type == SessionType::Work && s.outcome == SessionOutcome::Completed)
        .map(|s| s.end_time)
        .collect();
    end_times.sort();
    Ok(streak_from_end_times(&end_times))
}

/// Every `long_break_every`-th completed work session earns a long break.
pub fn recommended_break(streak: u32, settings: &Settings) -> BreakKind {
    let every = settings.long_break_every.max(1);
    if streak > 0 && streak % every == 0 {
        BreakKind::Long
    } else {
        BreakKind::Short
    }
}

/// Totals for sessions started today.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodayStats {
    /// Work minutes in every outcome.
    pub total_work_minutes: f64,
    /// Break minutes in every outcome.
    pub total_break_minutes: f64,
    pub work_completed: u32,
    pub work_abandoned: u32,
    pub break_completed: u32,
}

impl TodayStats {
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a SessionRecord>) -> Self {
        let mut stats = Self::default();
        for s in sessions {
            match s.session_type {
                SessionType::Work => {
                    stats.total_work_minutes += s.actual_duration_minutes;
                    match s.outcome {
                        SessionOutcome::Completed => stats.work_completed += 1,
                        SessionOutcome::Abandoned => stats.work_abandoned += 1,
                        SessionOutcome::EndedEarly => {}
                    }
                }
                SessionType::Break => {
                    stats.total_break_minutes += s.actual_duration_minutes;
                    if s.outcome == SessionOutcome::Completed {
                        stats.break_completed += 1;
                    }
                }
            }
        }
        stats
    }
}

pub fn todays_stats(db: &Database, now: DateTime<Utc>) -> Result<TodayStats, DatabaseError> {
    let (start, end) = day_bounds(now);
    Ok(TodayStats::from_sessions(&db.sessions_in_range(start, end)?))
}
