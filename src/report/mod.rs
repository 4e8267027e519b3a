pub mod types;

pub use types::{ContributorsReport, DashboardReport, PrRow, Report, TimelineReport};

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::builds::BuildStatus;
use crate::metrics::format_elapsed;
use crate::pulls::PrState;
use crate::timeline::{EventKind, ReviewMetrics, ReviewState, TimelineEvent};

/// Comment bodies longer than this are cut off unless full bodies are requested.
const BODY_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(report = %report.title()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print!("{}", render_terminal(report));
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            std::fs::write(path, render_markdown(report))?;
            Ok(())
        }
    }
}

pub fn render_terminal(report: &Report) -> String {
    match report {
        Report::Timeline(t) => terminal_timeline(t),
        Report::Dashboard(d) => terminal_dashboard(d),
        Report::Contributors(c) => {
            let mut out = format!("\n═══ {} ═══\n", report.title());
            if c.contributors.is_empty() {
                out.push_str("  No contributors available.\n");
            }
            for contributor in &c.contributors {
                out.push_str(&format!("  • {} ({})\n", contributor.login, contributor.contributions));
            }
            out
        }
    }
}

pub fn render_markdown(report: &Report) -> String {
    match report {
        Report::Timeline(t) => markdown_timeline(t),
        Report::Dashboard(d) => markdown_dashboard(d),
        Report::Contributors(c) => {
            let mut md = format!("# {}\n\n", report.title());
            if c.contributors.is_empty() {
                md.push_str("No contributors available.\n");
            }
            for contributor in &c.contributors {
                md.push_str(&format!("- **{}** ({})\n", contributor.login, contributor.contributions));
            }
            md
        }
    }
}

fn terminal_timeline(report: &TimelineReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nPR #{}: \"{}\"\n", report.number, report.title));
    out.push_str(&format!("https://github.com/{}/pull/{}\n\n", report.repo, report.number));

    if let Some(metrics) = &report.metrics {
        let (first, approval, total) = metric_cells(metrics);
        out.push_str(&format!(
            "Time to first review: {} | Time to approval: {} | Total time ({}): {}\n\n",
            first.bold(),
            approval.bold(),
            metrics.outcome,
            total.bold()
        ));
    }

    out.push_str("═══ Timeline ═══\n");
    if report.timeline.is_empty() {
        out.push_str("  No events.\n");
    }
    for event in report.timeline.events() {
        let actor = event
            .actor()
            .map(|by| format!(" by {}", by.cyan()))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {} {}{}  ({})\n",
            event.at.format("%b %-d, %H:%M").to_string().dimmed(),
            colorize_event(event),
            actor,
            relative_time(event.at, report.generated_at)
        ));
        if let Some(body) = event.body().filter(|b| !b.trim().is_empty()) {
            for line in preview(body, report.full_bodies).lines() {
                out.push_str(&format!("      │ {line}\n"));
            }
        }
    }
    out.push('\n');
    out
}

fn markdown_timeline(report: &TimelineReport) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}: \"{}\"\n\n", report_heading(report), report.title));
    md.push_str(&format!(
        "[View on GitHub](https://github.com/{}/pull/{})\n\n",
        report.repo,
        report.number
    ));

    if let Some(metrics) = &report.metrics {
        let (first, approval, total) = metric_cells(metrics);
        md.push_str(&format!("| Time to first review | Time to approval | Total time ({}) |\n", metrics.outcome));
        md.push_str("|---|---|---|\n");
        md.push_str(&format!("| {first} | {approval} | {total} |\n\n"));
    }

    md.push_str("## Timeline\n\n");
    if report.timeline.is_empty() {
        md.push_str("No events.\n");
    }
    for event in report.timeline.events() {
        let actor = event.actor().map(|by| format!(" by **{by}**")).unwrap_or_default();
        md.push_str(&format!(
            "- `{}` **{}**{}\n",
            event.at.format("%Y-%m-%d %H:%M"),
            event.label(),
            actor
        ));
        if let Some(body) = event.body().filter(|b| !b.trim().is_empty()) {
            for line in preview(body, report.full_bodies).lines() {
                md.push_str(&format!("  > {line}\n"));
            }
        }
    }
    md
}

fn report_heading(report: &TimelineReport) -> String {
    format!("{} • PR #{}", report.repo, report.number)
}

fn metric_cells(metrics: &ReviewMetrics) -> (String, String, String) {
    let hours = |h: Option<i64>| {
        h.map(|h| format_elapsed(chrono::Duration::hours(h)))
            .unwrap_or_else(|| "N/A".to_string())
    };
    (
        hours(metrics.time_to_first_review),
        hours(metrics.time_to_approval),
        hours(Some(metrics.total_time)),
    )
}

fn terminal_dashboard(report: &DashboardReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    out.push_str(&format!("\n═══ {} (last {} days) ═══\n", report.repo, report.list_days));
    out.push_str(&format!(
        "PRs: {} | Open: {} | Merged: {} | Closed: {} | Avg time to merge: {}\n",
        s.total.to_string().bold(),
        s.open,
        s.merged,
        s.closed,
        s.avg_time_to_merge
            .map(format_elapsed)
            .unwrap_or_else(|| "N/A".to_string())
    ));

    out.push_str(&format!("\n═══ Build metrics (last {} days) ═══\n", report.metrics_days));
    match &report.builds {
        Some(builds) => {
            let max = builds.per_day.iter().map(|b| b.count).max().unwrap_or(0).max(1);
            for bucket in &builds.per_day {
                let width = bucket.count * 30 / max;
                out.push_str(&format!(
                    "  {:>6} {:>3} {}\n",
                    bucket.date.format("%b %-d").to_string(),
                    bucket.count,
                    "█".repeat(width).blue()
                ));
            }
            out.push_str(&format!(
                "  Avg build time: {}\n",
                builds
                    .avg_duration
                    .map(format_elapsed)
                    .unwrap_or_else(|| "N/A".to_string())
            ));
        }
        None => {
            out.push_str("  Build metrics unavailable.\n");
        }
    }

    if let Some(trends) = &report.trends {
        out.push_str("\n═══ PR trends ═══\n");
        for point in trends {
            out.push_str(&format!(
                "  {:>6}  PRs: {:>4}  Avg merge: {:.1} days\n",
                point.month.label(),
                point.pr_count,
                point.avg_merge_days
            ));
        }
    }

    let rows = &report.rows;
    out.push_str(&format!(
        "\n═══ Pull requests (page {}/{}, {} total) ═══\n",
        rows.page,
        rows.total_pages,
        rows.total_items
    ));
    if rows.items.is_empty() {
        out.push_str(&format!("  No PRs in the last {} days.\n", report.list_days));
    }
    for row in &rows.items {
        out.push_str(&format!(
            "  #{} • {} {} {}{}\n",
            row.number,
            row.title,
            colorize_state(row.state),
            colorize_build(row.build),
            row_flags(row)
        ));
        out.push_str(&format!(
            "      by {} • {}\n",
            row.author.as_deref().unwrap_or("unknown"),
            row.created_at
                .map(|at| relative_time(at, report.generated_at))
                .unwrap_or_default()
        ));
    }
    out.push('\n');
    out
}

fn markdown_dashboard(report: &DashboardReport) -> String {
    let mut md = String::new();
    let s = &report.summary;
    md.push_str(&format!("# {} (last {} days)\n\n", report.repo, report.list_days));
    md.push_str("| PRs | Open | Merged | Closed | Avg time to merge |\n");
    md.push_str("|---|---|---|---|---|\n");
    md.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        s.total,
        s.open,
        s.merged,
        s.closed,
        s.avg_time_to_merge
            .map(format_elapsed)
            .unwrap_or_else(|| "N/A".to_string())
    ));

    md.push_str(&format!("## Build metrics (last {} days)\n\n", report.metrics_days));
    match &report.builds {
        Some(builds) => {
            md.push_str("| Day | Builds |\n");
            md.push_str("|---|---|\n");
            for bucket in &builds.per_day {
                md.push_str(&format!("| {} | {} |\n", bucket.date.format("%b %-d"), bucket.count));
            }
            md.push_str(&format!(
                "\n**Avg build time:** {}\n\n",
                builds
                    .avg_duration
                    .map(format_elapsed)
                    .unwrap_or_else(|| "N/A".to_string())
            ));
        }
        None => md.push_str("Build metrics unavailable.\n\n"),
    }

    if let Some(trends) = &report.trends {
        md.push_str("## PR trends\n\n");
        md.push_str("| Month | PRs | Avg merge (days) |\n");
        md.push_str("|---|---|---|\n");
        for point in trends {
            md.push_str(&format!(
                "| {} | {} | {:.1} |\n",
                point.month.label(),
                point.pr_count,
                point.avg_merge_days
            ));
        }
        md.push('\n');
    }

    let rows = &report.rows;
    md.push_str(&format!(
        "## Pull requests (page {}/{}, {} total)\n\n",
        rows.page,
        rows.total_pages,
        rows.total_items
    ));
    for row in &rows.items {
        md.push_str(&format!(
            "- **#{}** {} by {} — `{}` build: **{}**{}\n",
            row.number,
            row.title,
            row.author.as_deref().unwrap_or("unknown"),
            row.state,
            row.build,
            row_flags(row)
        ));
    }
    md
}

fn row_flags(row: &PrRow) -> String {
    let mut flags = String::new();
    if row.done {
        flags.push_str(" [done]");
    }
    if row.deferred {
        flags.push_str(" [deferred]");
    }
    if let Some(assignee) = &row.assignee {
        flags.push_str(&format!(" [→ {assignee}]"));
    }
    flags
}

/// Cut `body` to the preview length, marking the cut with "...".
fn preview(body: &str, full: bool) -> String {
    if full || body.chars().count() <= BODY_PREVIEW_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// "3h ago", "in 5m", "just now".
fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - at;
    if delta.num_minutes().abs() < 1 {
        "just now".to_string()
    } else if delta > chrono::Duration::zero() {
        format!("{} ago", format_elapsed(delta))
    } else {
        format!("in {}", format_elapsed(-delta))
    }
}

fn colorize_event(event: &TimelineEvent) -> colored::ColoredString {
    let label = event.label();
    match &event.kind {
        EventKind::Opened { .. } => label.green().bold(),
        EventKind::ReviewRequested { .. } | EventKind::Comment { .. } => label.blue().bold(),
        EventKind::Review { state, .. } => match state {
            Some(ReviewState::Approved) => label.green().bold(),
            Some(ReviewState::ChangesRequested) => label.red().bold(),
            _ => label.yellow().bold(),
        },
        EventKind::Merged { .. } => label.magenta().bold(),
        EventKind::Closed { .. } => label.dimmed().bold(),
    }
}

fn colorize_state(state: PrState) -> colored::ColoredString {
    match state {
        PrState::Open => "[open]".green(),
        PrState::Merged => "[merged]".magenta(),
        PrState::Closed => "[closed]".dimmed(),
    }
}

fn colorize_build(status: BuildStatus) -> colored::ColoredString {
    match status {
        BuildStatus::Success => "● Success".green().bold(),
        BuildStatus::Failure => "● Failure".red().bold(),
        BuildStatus::Pending => "● Pending".yellow().bold(),
        BuildStatus::Unknown => "● Unknown".dimmed(),
    }
}
