pub mod config;
pub mod history;
pub mod session;
pub mod stats;

use chrono::{DateTime, Local, Utc};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// `mm:ss`, or `h:mm:ss` past an hour.
pub(crate) fn clock(minutes: f64) -> String {
    let total = (minutes.max(0.0) * 60.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub(crate) fn local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
