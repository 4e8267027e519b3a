use std::collections::HashMap;
use std::sync::Arc;

use crate::github::RepoRef;

/// Overall CI verdict for one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Success,
    Failure,
    Pending,
    /// Neither the check-run nor the legacy status API yielded usable data
    Unknown,
}

impl BuildStatus {
    /// Map a legacy combined-status `state` string.
    pub fn from_legacy_state(state: &str) -> Self {
        match state {
            "success" => BuildStatus::Success,
            "failure" => BuildStatus::Failure,
            "pending" => BuildStatus::Pending,
            _ => BuildStatus::Unknown,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "Success"),
            BuildStatus::Failure => write!(f, "Failure"),
            BuildStatus::Pending => write!(f, "Pending"),
            BuildStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A resolved status together with the commit it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatus {
    pub sha: String,
    pub status: BuildStatus,
}

/// Immutable snapshot of the cache, keyed by PR number.
pub type StatusMap = Arc<HashMap<u64, CachedStatus>>;

/// PRs whose status must be (re)fetched, tagged with the cache generation
/// that planned them.
#[derive(Debug, Clone)]
pub struct StatusBatch {
    pub(crate) generation: u64,
    pub repo: RepoRef,
    /// (PR number, head SHA)
    pub items: Vec<(u64, String)>,
}

/// Outcome of executing a [`StatusBatch`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub(crate) generation: u64,
    pub resolved: Vec<(u64, CachedStatus)>,
    /// PR numbers whose lookup failed; these stay uncached
    pub failed: Vec<u64>,
}
