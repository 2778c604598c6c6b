use chrono::{Local, Utc};
use clap::Args;
use lockin_core::stats::{self, Granularity, Period, PeriodReport, Totals};
use lockin_core::Database;

use super::CliResult;

#[derive(Args)]
pub struct StatsArgs {
    /// today, week, month or year
    #[arg(default_value = "today")]
    period: String,
    /// Reference date: DDMMYY for week/month, YYYY for year
    date: Option<String>,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: StatsArgs) -> CliResult {
    let db = Database::open()?;

    if args.period == "today" {
        let now = Utc::now();
        let today = stats::todays_stats(&db, now)?;
        let streak = stats::current_streak(&db, now)?;
        if args.json {
            let value = serde_json::json!({ "today": today, "streak": streak });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("Work:   {:.0} min ({} completed, {} abandoned)", today.total_work_minutes, today.work_completed, today.work_abandoned);
            println!("Breaks: {:.0} min ({} completed)", today.total_break_minutes, today.break_completed);
            println!("Streak: {streak}");
        }
        return Ok(());
    }

    let period: Period = args.period.parse()?;
    let reference = period.parse_reference(args.date.as_deref(), Local::now().date_naive())?;
    let report = stats::period_report(&db, period, reference)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

fn render(report: &PeriodReport) -> String {
    let last_day = report.end.pred_opt().unwrap_or(report.end);
    let mut out = format!(
        "{} of {} to {}\n",
        capitalize(report.period.as_str()),
        report.start.format("%d %b %Y"),
        last_day.format("%d %b %Y")
    );
    for bucket in &report.buckets {
        let label = match report.period.granularity() {
            Granularity::Day => bucket.start.format("%a %d %b").to_string(),
            Granularity::Week => format!("Week of {}", bucket.start.format("%d %b")),
            Granularity::Month => bucket.start.format("%b %Y").to_string(),
        };
        out.push_str(&format!("  {label:<16} {}\n", row(&bucket.totals)));
    }
    out.push_str(&format!("  {:<16} {}\n", "Total", row(&report.totals)));
    out
}

fn row(t: &Totals) -> String {
    format!(
        "{:>5.0} min work ({:>2} done), {:>4.0} min abandoned ({} sessions), {:>4.0} min break",
        t.completed_work_minutes,
        t.completed_work_sessions,
        t.abandoned_work_minutes,
        t.abandoned_work_sessions,
        t.break_minutes
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
