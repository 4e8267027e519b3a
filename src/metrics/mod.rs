pub mod types;

pub use types::{BuildMetrics, DayBucket, MonthKey, RepoSummary, TrendPoint};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;

use crate::github::types::WorkflowRun;
use crate::github::PullRequest;

/// Render an hour count compactly: minutes below one hour, rounded hours
/// below a day, rounded days otherwise.
pub fn format_duration(hours: f64) -> String {
    if hours < 1.0 {
        format!("{}m", (hours * 60.0).round())
    } else if hours < 24.0 {
        format!("{}h", hours.round())
    } else {
        format!("{}d", (hours / 24.0).round())
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format_duration(elapsed.num_milliseconds() as f64 / 3_600_000.0)
}

fn mean(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total_ms: i64 = durations.iter().map(Duration::num_milliseconds).sum();
    Some(Duration::milliseconds(total_ms / durations.len() as i64))
}

fn merge_time(pr: &PullRequest) -> Option<Duration> {
    Some(pr.merged_at? - pr.created_at?)
}

pub fn summarize(prs: &[PullRequest]) -> RepoSummary {
    let merge_times: Vec<Duration> = prs.iter().filter_map(merge_time).collect();
    RepoSummary {
        total: prs.len(),
        open: prs.iter().filter(|p| p.state == "open").count(),
        merged: prs.iter().filter(|p| p.merged_at.is_some()).count(),
        closed: prs
            .iter()
            .filter(|p| p.state == "closed" && p.merged_at.is_none())
            .count(),
        avg_time_to_merge: mean(&merge_times),
    }
}

/// The last `days` calendar days ending at `today`, oldest first.
pub fn last_n_days(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .rev()
        .map(|back| today - Duration::days(back))
        .collect()
}

/// Count timestamps per local calendar day over the window ending at
/// `today`. Every day of the window is present; timestamps falling outside
/// it are ignored.
pub fn bucket_by_day<Tz, I>(timestamps: I, today: NaiveDate, days: u32, tz: &Tz) -> Vec<DayBucket>
where
    Tz: TimeZone,
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let window = last_n_days(today, days);
    let mut counts: HashMap<NaiveDate, usize> = window.iter().map(|d| (*d, 0)).collect();
    for at in timestamps {
        if let Some(count) = counts.get_mut(&at.with_timezone(tz).date_naive()) {
            *count += 1;
        }
    }
    window
        .into_iter()
        .map(|date| DayBucket {
            date,
            count: counts[&date],
        })
        .collect()
}

/// Builds per day plus the mean duration of completed runs.
///
/// A run's duration is `updated_at - (run_started_at or created_at)`;
/// non-positive durations are skipped.
pub fn build_metrics<Tz: TimeZone>(
    runs: &[WorkflowRun],
    today: NaiveDate,
    days: u32,
    tz: &Tz,
) -> BuildMetrics {
    let per_day = bucket_by_day(runs.iter().map(|r| r.created_at), today, days, tz);
    let durations: Vec<Duration> = runs
        .iter()
        .filter(|r| r.status.as_deref() == Some("completed"))
        .map(|r| r.updated_at - r.run_started_at.unwrap_or(r.created_at))
        .filter(|d| *d > Duration::zero())
        .collect();
    BuildMetrics {
        per_day,
        avg_duration: mean(&durations),
    }
}

/// The last `months` calendar months ending with the month of `today`,
/// oldest first.
pub fn last_n_months(today: NaiveDate, months: u32) -> Vec<MonthKey> {
    let current = MonthKey::of(today);
    (0..months).rev().map(|back| current.minus(back)).collect()
}

/// Monthly PR volume and merge speed. A PR counts towards the month it was
/// created in; its merge time counts towards the month it was merged in.
pub fn monthly_trends<Tz: TimeZone>(
    prs: &[PullRequest],
    today: NaiveDate,
    months: u32,
    tz: &Tz,
) -> Vec<TrendPoint> {
    let window = last_n_months(today, months);
    let mut counts: HashMap<MonthKey, (usize, Vec<Duration>)> =
        window.iter().map(|m| (*m, (0, Vec::new()))).collect();
    let month_of = |at: DateTime<Utc>| MonthKey::of(at.with_timezone(tz).date_naive());

    for pr in prs {
        let Some(created_at) = pr.created_at else {
            continue;
        };
        if let Some((count, _)) = counts.get_mut(&month_of(created_at)) {
            *count += 1;
        }
        if let Some(merged_at) = pr.merged_at {
            if let Some((_, merges)) = counts.get_mut(&month_of(merged_at)) {
                merges.push(merged_at - created_at);
            }
        }
    }

    window
        .into_iter()
        .map(|month| {
            let (pr_count, merges) = &counts[&month];
            let avg_merge_days = mean(merges)
                .map(|d| {
                    let days = d.num_milliseconds() as f64 / 86_400_000.0;
                    (days * 10.0).round() / 10.0
                })
                .unwrap_or(0.0);
            TrendPoint {
                month,
                pr_count: *pr_count,
                avg_merge_days,
            }
        })
        .collect()
}
