pub mod types;

pub use types::{BatchResult, BuildStatus, CachedStatus, StatusBatch, StatusMap};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

use crate::github::types::{CheckRun, CheckRunList, CombinedStatus};
use crate::github::{GitHubClient, GitHubError, PullRequest, RepoRef};

const FAILING_CONCLUSIONS: &[&str] = &[
    "failure",
    "timed_out",
    "cancelled",
    "action_required",
    "startup_failure",
];
const PASSING_CONCLUSIONS: &[&str] = &["success", "neutral", "skipped", "stale"];

/// The two commit-status APIs the resolver consults.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_runs(&self, repo: &RepoRef, sha: &str) -> Result<CheckRunList, GitHubError>;

    async fn combined_status(&self, repo: &RepoRef, sha: &str)
        -> Result<CombinedStatus, GitHubError>;
}

#[async_trait]
impl StatusSource for GitHubClient {
    async fn check_runs(&self, repo: &RepoRef, sha: &str) -> Result<CheckRunList, GitHubError> {
        GitHubClient::check_runs(self, repo, sha).await
    }

    async fn combined_status(
        &self,
        repo: &RepoRef,
        sha: &str,
    ) -> Result<CombinedStatus, GitHubError> {
        GitHubClient::combined_status(self, repo, sha).await
    }
}

/// Reduce a non-empty set of check runs to one status.
pub fn conclude_check_runs(runs: &[CheckRun]) -> BuildStatus {
    if runs.iter().any(|run| run.status != "completed") {
        return BuildStatus::Pending;
    }

    let conclusions: Vec<Option<&str>> = runs.iter().map(|run| run.conclusion.as_deref()).collect();

    if conclusions
        .iter()
        .flatten()
        .any(|c| FAILING_CONCLUSIONS.contains(c))
    {
        BuildStatus::Failure
    } else if conclusions
        .iter()
        .all(|c| c.is_some_and(|c| PASSING_CONCLUSIONS.contains(&c)))
    {
        BuildStatus::Success
    } else {
        BuildStatus::Pending
    }
}

/// Resolve the build status of a commit: check runs first, legacy combined
/// status when the commit has no check runs.
///
/// `Ok(BuildStatus::Unknown)` means the APIs answered without a usable state.
/// `Err` means the lookup itself failed; callers show it as unknown but must
/// not remember it.
pub async fn resolve_build_status(
    source: &dyn StatusSource,
    repo: &RepoRef,
    sha: &str,
) -> Result<BuildStatus, GitHubError> {
    match source.check_runs(repo, sha).await {
        Ok(list) if list.total_count > 0 && !list.check_runs.is_empty() => {
            let mut status = conclude_check_runs(&list.check_runs);
            let seen = list.check_runs.len() as u64;
            // Runs that were never read may still be failing or in progress
            if seen < list.total_count && status != BuildStatus::Failure {
                status = BuildStatus::Pending;
            }
            debug!(seen, total = list.total_count, %status, "resolved from check runs");
            return Ok(status);
        }
        Ok(_) => debug!("no check runs, falling back to combined status"),
        Err(e) => warn!(error = %e, "check runs unavailable, falling back to combined status"),
    }

    let combined = source.combined_status(repo, sha).await.map_err(|e| {
        warn!(error = %e, "combined status unavailable");
        e
    })?;
    Ok(combined
        .state
        .as_deref()
        .map_or(BuildStatus::Unknown, BuildStatus::from_legacy_state))
}

/// Per-PR build status cache for one repository.
///
/// Entries are only valid for the head SHA they were resolved for. Reads go
/// through an `Arc` snapshot; writes replace the map copy-on-write.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    repo: Option<RepoRef>,
    generation: u64,
    entries: StatusMap,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the cache at `repo`, dropping every entry if it changed.
    /// In-flight batches planned for the previous repository are discarded
    /// when applied.
    pub fn set_repository(&mut self, repo: &RepoRef) {
        if self.repo.as_ref() == Some(repo) {
            return;
        }
        debug!(repo = %repo, "status cache reset");
        self.repo = Some(repo.clone());
        self.generation += 1;
        self.entries = Arc::new(HashMap::new());
    }

    /// Cached status for `number`, if it was resolved for `sha`.
    pub fn lookup(&self, number: u64, sha: &str) -> Option<BuildStatus> {
        self.entries
            .get(&number)
            .filter(|entry| entry.sha == sha)
            .map(|entry| entry.status)
    }

    pub fn snapshot(&self) -> StatusMap {
        Arc::clone(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Collect the PRs that need a lookup: those with a head SHA and no
    /// entry for that SHA. Returns `None` when nothing needs fetching.
    pub fn plan<'a, I>(&self, prs: I) -> Option<StatusBatch>
    where
        I: IntoIterator<Item = &'a PullRequest>,
    {
        let repo = self.repo.clone()?;
        let mut seen = HashSet::new();
        let items: Vec<(u64, String)> = prs
            .into_iter()
            .filter_map(|pr| pr.head_sha().map(|sha| (pr.number, sha)))
            .filter(|(number, sha)| self.lookup(*number, sha).is_none())
            .filter(|(number, _)| seen.insert(*number))
            .map(|(number, sha)| (number, sha.to_string()))
            .collect();

        if items.is_empty() {
            return None;
        }
        Some(StatusBatch {
            generation: self.generation,
            repo,
            items,
        })
    }

    /// Merge a finished batch. Results planned under an older generation
    /// (the repository changed meanwhile) are dropped; returns whether the
    /// batch was applied. Failed lookups are not stored, so the next `plan`
    /// picks them up again.
    pub fn apply(&mut self, result: BatchResult) -> bool {
        if result.generation != self.generation {
            debug!(
                stale = result.generation,
                current = self.generation,
                "discarding stale status batch"
            );
            return false;
        }
        if !result.failed.is_empty() {
            debug!(failed = ?result.failed, "leaving failed lookups for the next refresh");
        }
        if result.resolved.is_empty() {
            return true;
        }
        let entries = Arc::make_mut(&mut self.entries);
        for (number, cached) in result.resolved {
            entries.insert(number, cached);
        }
        true
    }

    /// Plan, execute and apply in one step. Returns the number of lookups made.
    pub async fn refresh<'a, I>(&mut self, source: &dyn StatusSource, prs: I) -> usize
    where
        I: IntoIterator<Item = &'a PullRequest>,
    {
        let Some(batch) = self.plan(prs) else {
            return 0;
        };
        let fetched = batch.items.len();
        let result = batch.execute(source).await;
        self.apply(result);
        fetched
    }
}

impl StatusBatch {
    /// Resolve every item concurrently.
    pub async fn execute(self, source: &dyn StatusSource) -> BatchResult {
        let repo = &self.repo;
        let lookups = self.items.into_iter().map(|(number, sha)| {
            async move {
                let status = resolve_build_status(source, repo, &sha).await;
                (number, sha, status)
            }
            .instrument(info_span!("build_status", pr = number))
        });

        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        for (number, sha, status) in futures::future::join_all(lookups).await {
            match status {
                Ok(status) => resolved.push((number, CachedStatus { sha, status })),
                Err(_) => failed.push(number),
            }
        }
        BatchResult {
            generation: self.generation,
            resolved,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run(status: &str, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
        }
    }

    fn repo(name: &str) -> RepoRef {
        RepoRef {
            owner: "org".to_string(),
            repo: name.to_string(),
        }
    }

    fn pr(number: u64, sha: Option<&str>) -> PullRequest {
        serde_json::from_value(serde_json::json!({
            "id": number,
            "number": number,
            "state": "open",
            "head": { "sha": sha }
        }))
        .unwrap()
    }

    /// Scripted source that counts calls per endpoint.
    #[derive(Default)]
    struct FakeSource {
        runs: Mutex<HashMap<String, Vec<CheckRun>>>,
        legacy: Mutex<HashMap<String, String>>,
        /// Number of upcoming legacy calls that fail before the scripted state is served
        legacy_outages: AtomicUsize,
        check_run_calls: AtomicUsize,
        legacy_calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_runs(self, sha: &str, runs: Vec<CheckRun>) -> Self {
            self.runs.lock().unwrap().insert(sha.to_string(), runs);
            self
        }

        fn with_legacy(self, sha: &str, state: &str) -> Self {
            self.legacy
                .lock()
                .unwrap()
                .insert(sha.to_string(), state.to_string());
            self
        }

        fn with_legacy_outages(self, count: usize) -> Self {
            self.legacy_outages.store(count, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        async fn check_runs(&self, _repo: &RepoRef, sha: &str) -> Result<CheckRunList, GitHubError> {
            self.check_run_calls.fetch_add(1, Ordering::SeqCst);
            let runs = self.runs.lock().unwrap().get(sha).cloned().unwrap_or_default();
            Ok(CheckRunList {
                total_count: runs.len() as u64,
                check_runs: runs,
            })
        }

        async fn combined_status(
            &self,
            _repo: &RepoRef,
            sha: &str,
        ) -> Result<CombinedStatus, GitHubError> {
            self.legacy_calls.fetch_add(1, Ordering::SeqCst);
            let outage = self
                .legacy_outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if outage {
                return Err(GitHubError::Api {
                    status: 403,
                    body: "API rate limit exceeded".to_string(),
                });
            }
            match self.legacy.lock().unwrap().get(sha) {
                Some(state) => Ok(CombinedStatus {
                    state: Some(state.clone()),
                }),
                None => Err(GitHubError::Api {
                    status: 404,
                    body: "No commit found".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_in_progress_run_is_pending_regardless_of_conclusion() {
        let runs = vec![run("in_progress", Some("failure")), run("completed", Some("success"))];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Pending);
    }

    #[test]
    fn test_passing_conclusions_succeed() {
        let runs = vec![run("completed", Some("success")), run("completed", Some("neutral"))];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Success);
    }

    #[test]
    fn test_any_failing_conclusion_fails() {
        let runs = vec![run("completed", Some("success")), run("completed", Some("failure"))];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Failure);
        let runs = vec![run("completed", Some("startup_failure"))];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Failure);
    }

    #[test]
    fn test_unrecognised_or_missing_conclusion_is_pending() {
        let runs = vec![run("completed", Some("success")), run("completed", None)];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Pending);
        let runs = vec![run("completed", Some("mystery"))];
        assert_eq!(conclude_check_runs(&runs), BuildStatus::Pending);
    }

    #[tokio::test]
    async fn test_zero_check_runs_falls_back_to_legacy_failure() {
        let source = FakeSource::default().with_legacy("abc", "failure");
        let status = resolve_build_status(&source, &repo("r"), "abc").await.unwrap();
        assert_eq!(status, BuildStatus::Failure);
        assert_eq!(source.legacy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_runs_take_precedence_over_legacy() {
        let source = FakeSource::default()
            .with_runs("abc", vec![run("completed", Some("success"))])
            .with_legacy("abc", "failure");
        let status = resolve_build_status(&source, &repo("r"), "abc").await.unwrap();
        assert_eq!(status, BuildStatus::Success);
        assert_eq!(source.legacy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_apis_failing_is_an_error() {
        let source = FakeSource::default();
        let result = resolve_build_status(&source, &repo("r"), "abc").await;
        assert!(matches!(result, Err(GitHubError::Api { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_unseen_check_runs_keep_status_pending() {
        struct Partial;

        #[async_trait]
        impl StatusSource for Partial {
            async fn check_runs(&self, _repo: &RepoRef, _sha: &str) -> Result<CheckRunList, GitHubError> {
                Ok(CheckRunList {
                    total_count: 3,
                    check_runs: vec![run("completed", Some("success"))],
                })
            }

            async fn combined_status(
                &self,
                _repo: &RepoRef,
                _sha: &str,
            ) -> Result<CombinedStatus, GitHubError> {
                panic!("legacy status must not be consulted when check runs exist");
            }
        }

        let status = resolve_build_status(&Partial, &repo("r"), "abc").await.unwrap();
        assert_eq!(status, BuildStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_retried_on_next_refresh() {
        let source = FakeSource::default()
            .with_legacy("aaa", "success")
            .with_legacy_outages(1);
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));

        assert_eq!(cache.refresh(&source, &[pr(7, Some("aaa"))]).await, 1);
        assert_eq!(cache.lookup(7, "aaa"), None);
        assert_eq!(cache.len(), 0);

        assert_eq!(cache.refresh(&source, &[pr(7, Some("aaa"))]).await, 1);
        assert_eq!(cache.lookup(7, "aaa"), Some(BuildStatus::Success));
        assert_eq!(source.legacy_calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.refresh(&source, &[pr(7, Some("aaa"))]).await, 0);
    }

    #[tokio::test]
    async fn test_answer_without_state_is_cached_as_unknown() {
        struct NoState;

        #[async_trait]
        impl StatusSource for NoState {
            async fn check_runs(&self, _repo: &RepoRef, _sha: &str) -> Result<CheckRunList, GitHubError> {
                Ok(CheckRunList {
                    total_count: 0,
                    check_runs: Vec::new(),
                })
            }

            async fn combined_status(
                &self,
                _repo: &RepoRef,
                _sha: &str,
            ) -> Result<CombinedStatus, GitHubError> {
                Ok(CombinedStatus { state: None })
            }
        }

        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));
        assert_eq!(cache.refresh(&NoState, &[pr(3, Some("ccc"))]).await, 1);
        assert_eq!(cache.lookup(3, "ccc"), Some(BuildStatus::Unknown));
        assert_eq!(cache.refresh(&NoState, &[pr(3, Some("ccc"))]).await, 0);
    }

    #[tokio::test]
    async fn test_cache_refetches_only_on_sha_change() {
        let source = FakeSource::default()
            .with_legacy("aaa", "success")
            .with_legacy("bbb", "pending");
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));

        assert_eq!(cache.refresh(&source, &[pr(7, Some("aaa"))]).await, 1);
        assert_eq!(cache.refresh(&source, &[pr(7, Some("aaa"))]).await, 0);
        assert_eq!(source.check_run_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lookup(7, "aaa"), Some(BuildStatus::Success));

        assert_eq!(cache.refresh(&source, &[pr(7, Some("bbb"))]).await, 1);
        assert_eq!(source.check_run_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.lookup(7, "bbb"), Some(BuildStatus::Pending));
        assert_eq!(cache.lookup(7, "aaa"), None);
    }

    #[tokio::test]
    async fn test_cache_keeps_valid_entries_across_pages() {
        let source = FakeSource::default()
            .with_legacy("s1", "success")
            .with_legacy("s2", "failure");
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));

        cache.refresh(&source, &[pr(1, Some("s1"))]).await;
        cache.refresh(&source, &[pr(2, Some("s2"))]).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(1, "s1"), Some(BuildStatus::Success));
        assert_eq!(cache.lookup(2, "s2"), Some(BuildStatus::Failure));

        // Back to the first page: nothing to fetch
        assert_eq!(cache.refresh(&source, &[pr(1, Some("s1"))]).await, 0);
    }

    #[test]
    fn test_plan_skips_prs_without_head_sha_and_duplicates() {
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));
        let batch = cache
            .plan(&[pr(1, None), pr(2, Some("x")), pr(2, Some("x")), pr(3, Some(""))])
            .unwrap();
        assert_eq!(batch.items, vec![(2, "x".to_string())]);
    }

    #[test]
    fn test_plan_without_repository_is_empty() {
        let cache = StatusCache::new();
        assert!(cache.plan(&[pr(1, Some("x"))]).is_none());
    }

    #[tokio::test]
    async fn test_repository_change_clears_and_discards_stale_batches() {
        let source = FakeSource::default().with_legacy("aaa", "success");
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("one"));
        cache.refresh(&source, &[pr(7, Some("aaa"))]).await;
        assert_eq!(cache.len(), 1);

        let in_flight = cache.plan(&[pr(8, Some("aaa"))]).unwrap();
        cache.set_repository(&repo("two"));
        assert_eq!(cache.len(), 0);

        let result = in_flight.execute(&source).await;
        assert!(!cache.apply(result));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_writes() {
        let source = FakeSource::default()
            .with_legacy("aaa", "success")
            .with_legacy("bbb", "failure");
        let mut cache = StatusCache::new();
        cache.set_repository(&repo("r"));
        cache.refresh(&source, &[pr(7, Some("aaa"))]).await;

        let before = cache.snapshot();
        cache.refresh(&source, &[pr(8, Some("bbb"))]).await;
        assert_eq!(before.len(), 1);
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_github_client_resolves_through_check_runs_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/r/commits/abc/check-runs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 0,
                "check_runs": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/r/commits/abc/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "pending"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), None);
        let status = resolve_build_status(&client, &repo("r"), "abc").await.unwrap();
        assert_eq!(status, BuildStatus::Pending);
    }

    #[tokio::test]
    async fn test_failing_run_on_second_page_fails_the_build() {
        let server = MockServer::start().await;
        let successes: Vec<serde_json::Value> = (0..30)
            .map(|_| serde_json::json!({ "status": "completed", "conclusion": "success" }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/repos/org/r/commits/abc/check-runs"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 31,
                "check_runs": successes
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/r/commits/abc/check-runs"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 31,
                "check_runs": [{ "status": "completed", "conclusion": "failure" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(&server.uri(), None);
        let status = resolve_build_status(&client, &repo("r"), "abc").await.unwrap();
        assert_eq!(status, BuildStatus::Failure);
    }
}
