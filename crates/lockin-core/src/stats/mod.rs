//! Statistics over the session history.
//!
//! Everything here is read-only: streaks and today's totals for the status
//! views, and bucketed period reports for `lockin stats`.

mod report;
mod streak;

pub use report::{period_report, Bucket, Granularity, Period, PeriodReport, Totals};
pub use streak::{
    current_streak, day_bounds, local_midnight, recommended_break, streak_from_end_times,
    todays_stats, TodayStats, STREAK_GAP_MINUTES,
};
