use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A repository reference in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub repo: RepoRef,
    pub number: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Team {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitRef {
    pub sha: Option<String>,
}

/// Pull request as returned by both the list and the detail endpoints.
/// Only the fields the dashboard reads are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    /// "open" or "closed"; merged PRs report "closed"
    pub state: String,
    pub user: Option<User>,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged_by: Option<User>,
    #[serde(default)]
    pub head: CommitRef,
    #[serde(default)]
    pub assignees: Vec<User>,
}

impl PullRequest {
    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.head.sha.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub user: Option<User>,
    pub state: Option<String>,
    pub body: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Alternate spelling seen on some proxies and older payloads
    #[serde(rename = "submittedAt")]
    pub submitted_at_alt: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// An issue-level event (`/issues/{n}/events`). Only `review_requested`
/// entries are consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueEvent {
    pub event: String,
    pub created_at: DateTime<Utc>,
    pub actor: Option<User>,
    pub requested_reviewer: Option<User>,
    pub requested_team: Option<Team>,
}

/// Shared shape of issue comments and inline review comments.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub user: Option<User>,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRun {
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunList {
    pub total_count: u64,
    #[serde(default)]
    pub check_runs: Vec<CheckRun>,
}

/// Legacy combined commit status (`/commits/{sha}/status`).
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedStatus {
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contributor {
    pub login: String,
    #[serde(default)]
    pub contributions: u64,
}
