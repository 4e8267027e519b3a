pub mod types;

pub use types::{PrRef, PullRequest, RepoRef};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use types::{
    CheckRunList, CombinedStatus, Comment, Contributor, IssueEvent, Review, WorkflowRun,
    WorkflowRunList,
};

/// Upper bound on pages requested by a single logical fetch.
pub const MAX_PAGES: u32 = 5;
pub const PER_PAGE: u32 = 100;

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub API error {status}: {body}{}", hint(*.status))]
    Api { status: u16, body: String },

    #[error("Invalid repository: {0} (expected owner/repo)")]
    InvalidRepo(String),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),
}

fn hint(status: u16) -> &'static str {
    match status {
        401 => "\n\nAuthentication failed. For private repositories the token needs the \
                'repo' scope (classic) or read access to the repository (fine-grained).",
        403 => "\n\nForbidden. The token may lack permissions, the repository may be \
                private, or the rate limit was hit.",
        404 => "\n\nNot found. The repository may not exist, may be misspelled, or may be \
                private and require a token with access to it.",
        _ => "",
    }
}

/// Parse `owner/repo` into a [`RepoRef`].
pub fn parse_repo(s: &str) -> Result<RepoRef, GitHubError> {
    let mut parts = s.trim().split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Ok(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        _ => Err(GitHubError::InvalidRepo(s.to_string())),
    }
}

/// Parse a GitHub PR URL into its component parts.
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrRef, GitHubError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GitHubError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let number = segments[3]
        .parse::<u64>()
        .map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    Ok(PrRef {
        repo: RepoRef {
            owner: segments[0].to_string(),
            repo: segments[1].to_string(),
        },
        number,
    })
}

/// Thin authenticated wrapper over the GitHub REST API v3.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, repo.owner, repo.repo, rest)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, "pr-review-timeline");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GitHubError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// GET a JSON document; non-2xx responses become [`GitHubError::Api`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GitHubError> {
        debug!(url = %url, "GET");
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn pull_request(&self, pr: &PrRef) -> Result<PullRequest, GitHubError> {
        self.get_json(&self.repo_url(&pr.repo, &format!("pulls/{}", pr.number)))
            .await
    }

    pub async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>, GitHubError> {
        self.get_json(&self.repo_url(
            &pr.repo,
            &format!("pulls/{}/reviews?per_page={PER_PAGE}", pr.number),
        ))
        .await
    }

    pub async fn issue_events(&self, pr: &PrRef) -> Result<Vec<IssueEvent>, GitHubError> {
        self.get_json(&self.repo_url(
            &pr.repo,
            &format!("issues/{}/events?per_page={PER_PAGE}", pr.number),
        ))
        .await
    }

    pub async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, GitHubError> {
        self.get_json(&self.repo_url(
            &pr.repo,
            &format!("issues/{}/comments?per_page={PER_PAGE}", pr.number),
        ))
        .await
    }

    pub async fn review_comments(&self, pr: &PrRef) -> Result<Vec<Comment>, GitHubError> {
        self.get_json(&self.repo_url(
            &pr.repo,
            &format!("pulls/{}/comments?per_page={PER_PAGE}", pr.number),
        ))
        .await
    }

    /// All check runs of a commit. Pages are requested until `total_count`
    /// runs were seen, an empty page comes back, or `MAX_PAGES` is reached.
    pub async fn check_runs(&self, repo: &RepoRef, sha: &str) -> Result<CheckRunList, GitHubError> {
        let mut list = CheckRunList {
            total_count: 0,
            check_runs: Vec::new(),
        };
        for page in 1..=MAX_PAGES {
            let url = self.repo_url(
                repo,
                &format!("commits/{sha}/check-runs?per_page={PER_PAGE}&page={page}"),
            );
            let batch: CheckRunList = self.get_json(&url).await?;
            list.total_count = batch.total_count;
            if batch.check_runs.is_empty() {
                break;
            }
            list.check_runs.extend(batch.check_runs);
            if list.check_runs.len() as u64 >= list.total_count {
                break;
            }
        }
        debug!(
            seen = list.check_runs.len(),
            total = list.total_count,
            "fetched check runs"
        );
        Ok(list)
    }

    pub async fn combined_status(
        &self,
        repo: &RepoRef,
        sha: &str,
    ) -> Result<CombinedStatus, GitHubError> {
        self.get_json(&self.repo_url(repo, &format!("commits/{sha}/status")))
            .await
    }

    pub async fn contributors(&self, repo: &RepoRef) -> Result<Vec<Contributor>, GitHubError> {
        self.get_json(&self.repo_url(repo, &format!("contributors?per_page={PER_PAGE}")))
            .await
    }

    /// PRs created within the last `days` days, newest first.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn recent_pull_requests(
        &self,
        repo: &RepoRef,
        days: u32,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut results = collect_pages(cutoff, |page| async move {
            let url = self.repo_url(
                repo,
                &format!(
                    "pulls?state=all&per_page={PER_PAGE}&sort=created&direction=desc&page={page}"
                ),
            );
            let prs: Vec<PullRequest> = self.get_json(&url).await?;
            Ok::<_, GitHubError>(prs)
        }, |pr: &PullRequest| pr.created_at)
        .await?;

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(count = results.len(), "fetched recent pull requests");
        Ok(results)
    }

    /// Workflow runs created within the last `days` days.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn workflow_runs(
        &self,
        repo: &RepoRef,
        days: u32,
    ) -> Result<Vec<WorkflowRun>, GitHubError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let runs = collect_pages(cutoff, |page| async move {
            let url = self.repo_url(repo, &format!("actions/runs?per_page={PER_PAGE}&page={page}"));
            let list: WorkflowRunList = self.get_json(&url).await?;
            Ok::<_, GitHubError>(list.workflow_runs)
        }, |run: &WorkflowRun| Some(run.created_at))
        .await?;

        debug!(count = runs.len(), "fetched workflow runs");
        Ok(runs)
    }

    /// Add `login` to the issue's assignees.
    #[instrument(skip(self, pr), fields(repo = %pr.repo, pr = pr.number))]
    pub async fn assign(&self, pr: &PrRef, login: &str) -> Result<(), GitHubError> {
        self.send_assignees(reqwest::Method::POST, pr, login).await
    }

    /// Remove `login` from the issue's assignees.
    #[instrument(skip(self, pr), fields(repo = %pr.repo, pr = pr.number))]
    pub async fn unassign(&self, pr: &PrRef, login: &str) -> Result<(), GitHubError> {
        self.send_assignees(reqwest::Method::DELETE, pr, login).await
    }

    async fn send_assignees(
        &self,
        method: reqwest::Method,
        pr: &PrRef,
        login: &str,
    ) -> Result<(), GitHubError> {
        let url = self.repo_url(&pr.repo, &format!("issues/{}/assignees", pr.number));
        let response = self
            .request(method, &url)
            .json(&serde_json::json!({ "assignees": [login] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Walk pages `1..=MAX_PAGES`, keeping items created at or after `cutoff`.
/// Stops early on an empty page or once a page's last item predates the cutoff.
async fn collect_pages<T, F, Fut, K>(
    cutoff: DateTime<Utc>,
    mut fetch_page: F,
    created_at: K,
) -> Result<Vec<T>, GitHubError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<T>, GitHubError>>,
    K: Fn(&T) -> Option<DateTime<Utc>>,
{
    let mut results = Vec::new();
    for page in 1..=MAX_PAGES {
        let items = fetch_page(page).await?;
        if items.is_empty() {
            break;
        }

        let reached_cutoff = items
            .last()
            .and_then(|last| created_at(last))
            .map_or(true, |at| at < cutoff);

        results.extend(
            items
                .into_iter()
                .filter(|item| created_at(item).is_some_and(|at| at >= cutoff)),
        );

        if reached_cutoff {
            break;
        }
    }
    Ok(results)
}
