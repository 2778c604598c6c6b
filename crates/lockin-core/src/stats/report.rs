//! Week, month and year reports.

use chrono::{Datelike, Duration, Local, Months, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::streak::local_midnight;
use crate::engine::{SessionOutcome, SessionType};
use crate::error::{CoreError, PeriodError};
use crate::storage::{Database, SessionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
    Year,
}

/// Bucket width inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    /// Weeks starting Monday.
    Week,
    Month,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    pub fn granularity(self) -> Granularity {
        match self {
            Period::Week => Granularity::Day,
            Period::Month => Granularity::Week,
            Period::Year => Granularity::Month,
        }
    }

    /// Half-open date range of the period containing `reference`.
    pub fn range(self, reference: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Week => {
                let start = monday_of(reference);
                (start, start + Duration::days(7))
            }
            Period::Month => {
                let start = reference.with_day(1).unwrap_or(reference);
                (start, add_months(start, 1))
            }
            Period::Year => {
                let start = NaiveDate::from_ymd_opt(reference.year(), 1, 1).unwrap_or(reference);
                (start, add_months(start, 12))
            }
        }
    }

    /// Reference date from the command-line argument: `DDMMYY` for weeks
    /// and months, `YYYY` for years, `today` when absent.
    pub fn parse_reference(self, arg: Option<&str>, today: NaiveDate) -> Result<NaiveDate, PeriodError> {
        let Some(arg) = arg.map(str::trim) else {
            return Ok(today);
        };
        match self {
            Period::Week | Period::Month => {
                if arg.len() != 6 || !arg.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(PeriodError::InvalidDate(arg.to_string()));
                }
                NaiveDate::parse_from_str(arg, "%d%m%y")
                    .map_err(|_| PeriodError::InvalidDate(arg.to_string()))
            }
            Period::Year => arg
                .parse::<i32>()
                .ok()
                .filter(|y| (1900..=9999).contains(y) && arg.len() == 4)
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
                .ok_or_else(|| PeriodError::InvalidYear(arg.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(PeriodError::UnknownPeriod(other.to_string())),
        }
    }
}

impl Granularity {
    /// First day of the bucket containing `date`.
    fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => monday_of(date),
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next(self, start: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => start + Duration::days(1),
            Granularity::Week => start + Duration::days(7),
            Granularity::Month => add_months(start, 1),
        }
    }
}

/// Summed minutes and counts for one span of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub completed_work_minutes: f64,
    pub completed_work_sessions: u32,
    pub abandoned_work_minutes: f64,
    pub abandoned_work_sessions: u32,
    pub break_minutes: f64,
}

impl Totals {
    fn add(&mut self, s: &SessionRecord) {
        match (s.session_type, s.outcome) {
            (SessionType::Work, SessionOutcome::Completed) => {
                self.completed_work_minutes += s.actual_duration_minutes;
                self.completed_work_sessions += 1;
            }
            (SessionType::Work, SessionOutcome::Abandoned) => {
                self.abandoned_work_minutes += s.actual_duration_minutes;
                self.abandoned_work_sessions += 1;
            }
            (SessionType::Work, SessionOutcome::EndedEarly) => {}
            (SessionType::Break, _) => self.break_minutes += s.actual_duration_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// First day of the bucket. For weekly buckets this may precede the
    /// report start.
    pub start: NaiveDate,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub period: Period,
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
    pub totals: Totals,
    pub buckets: Vec<Bucket>,
}

impl PeriodReport {
    /// Build a report from `sessions`, placing each by the date it started
    /// on in `tz`. Sessions outside the period are ignored.
    pub fn build<Tz: TimeZone>(
        period: Period,
        reference: NaiveDate,
        sessions: &[SessionRecord],
        tz: &Tz,
    ) -> Self {
        let (start, end) = period.range(reference);
        let granularity = period.granularity();

        let mut buckets = Vec::new();
        let mut cursor = granularity.bucket_start(start);
        while cursor < end {
            buckets.push(Bucket {
                start: cursor,
                totals: Totals::default(),
            });
            cursor = granularity.next(cursor);
        }

        let mut totals = Totals::default();
        for s in sessions {
            let day = s.start_time.with_timezone(tz).date_naive();
            if day < start || day >= end {
                continue;
            }
            totals.add(s);
            let key = granularity.bucket_start(day);
            if let Some(bucket) = buckets.iter_mut().find(|b| b.start == key) {
                bucket.totals.add(s);
            }
        }

        Self {
            period,
            start,
            end,
            totals,
            buckets,
        }
    }
}

/// Report for the period containing `reference`, in local time.
pub fn period_report(
    db: &Database,
    period: Period,
    reference: NaiveDate,
) -> Result<PeriodReport, CoreError> {
    let (start, end) = period.range(reference);
    let sessions = db.sessions_in_range(local_midnight(start), local_midnight(end))?;
    Ok(PeriodReport::build(period, reference, &sessions, &Local))
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}
