use chrono::{DateTime, Utc};

use crate::builds::BuildStatus;
use crate::github::types::Contributor;
use crate::github::RepoRef;
use crate::metrics::{BuildMetrics, RepoSummary, TrendPoint};
use crate::pulls::{Page, PrState};
use crate::timeline::{ReviewMetrics, Timeline};

/// Review timeline of a single pull request.
#[derive(Debug)]
pub struct TimelineReport {
    pub repo: RepoRef,
    pub number: u64,
    pub title: String,
    /// `None` when the timeline has no `opened` event
    pub metrics: Option<ReviewMetrics>,
    pub timeline: Timeline,
    /// Show comment bodies in full instead of truncating them
    pub full_bodies: bool,
    pub generated_at: DateTime<Utc>,
}

/// One line of the PR list.
#[derive(Debug, Clone)]
pub struct PrRow {
    pub number: u64,
    pub title: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub state: PrState,
    pub build: BuildStatus,
    pub done: bool,
    pub deferred: bool,
    pub assignee: Option<String>,
}

/// Repository overview: summary, build metrics, optional trends, PR list page.
#[derive(Debug)]
pub struct DashboardReport {
    pub repo: RepoRef,
    pub list_days: u32,
    pub summary: RepoSummary,
    pub metrics_days: u32,
    /// `None` when workflow runs could not be fetched
    pub builds: Option<BuildMetrics>,
    pub trends: Option<Vec<TrendPoint>>,
    pub rows: Page<PrRow>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ContributorsReport {
    pub repo: RepoRef,
    pub contributors: Vec<Contributor>,
}

#[derive(Debug)]
pub enum Report {
    Timeline(TimelineReport),
    Dashboard(DashboardReport),
    Contributors(ContributorsReport),
}

impl Report {
    pub fn title(&self) -> String {
        match self {
            Report::Timeline(t) => format!("{} • PR #{}", t.repo, t.number),
            Report::Dashboard(d) => format!("{} dashboard", d.repo),
            Report::Contributors(c) => format!("{} contributors", c.repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_titles() {
        let repo = RepoRef {
            owner: "org".to_string(),
            repo: "repo".to_string(),
        };
        let report = Report::Contributors(ContributorsReport {
            repo: repo.clone(),
            contributors: vec![],
        });
        assert_eq!(report.title(), "org/repo contributors");

        let report = Report::Timeline(TimelineReport {
            repo,
            number: 42,
            title: String::new(),
            metrics: None,
            timeline: Timeline::default(),
            full_bodies: false,
            generated_at: Utc::now(),
        });
        assert_eq!(report.title(), "org/repo • PR #42");
    }
}
