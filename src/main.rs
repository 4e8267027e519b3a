mod builds;
mod config;
mod github;
mod metrics;
mod prefs;
mod pulls;
mod report;
mod timeline;

use chrono::{Local, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use builds::{BuildStatus, StatusCache};
use config::Config;
use github::{GitHubClient, PrRef, RepoRef};
use prefs::{JsonFileStore, Mark, Preferences};
use pulls::{PrFilter, PrState, StateFilter};
use report::{ContributorsReport, DashboardReport, PrRow, Report, TimelineReport};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// PR Review Timeline: visualize GitHub pull request review activity,
/// build status, and repository metrics from the terminal.
#[derive(Parser, Debug)]
#[command(name = "pr-review-timeline", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// GitHub token (overrides config file, GITHUB_TOKEN, and any remembered token)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Remember the resolved token for later runs
    #[arg(long, global = true, conflicts_with = "forget_token")]
    remember_token: bool,

    /// Drop any remembered token before resolving credentials
    #[arg(long, global = true)]
    forget_token: bool,

    /// Write a markdown report to this file instead of printing to the terminal
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review timeline of one pull request
    Timeline {
        /// PR URL (https://github.com/org/repo/pull/42) or owner/repo
        ///
        /// Not required when --mock is used.
        target: Option<String>,

        /// PR number, when TARGET is owner/repo
        number: Option<u64>,

        /// Use a built-in sample PR (no network access needed)
        #[arg(long)]
        r#mock: bool,

        /// Show review and comment bodies in full
        #[arg(long)]
        full: bool,
    },

    /// Repository metrics, build metrics and the recent PR list
    Dashboard {
        /// Repository as owner/repo
        repo: String,

        #[arg(long, value_enum, default_value_t = StateFilter::All)]
        state: StateFilter,

        /// Only PRs opened by this user
        #[arg(long)]
        author: Option<String>,

        /// Match against PR titles or #number
        #[arg(long)]
        search: Option<String>,

        /// PR list page (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Include closed and merged PRs (remembered per repository)
        #[arg(long, conflicts_with = "hide_closed")]
        show_closed: bool,

        /// Hide closed and merged PRs (remembered per repository)
        #[arg(long)]
        hide_closed: bool,

        /// Also show monthly PR trends
        #[arg(long)]
        trends: bool,

        /// Re-poll every N seconds; only PRs whose head commit changed are re-checked
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Assign a user to a pull request
    Assign {
        repo: String,
        number: u64,
        user: String,
    },

    /// Remove a user from a pull request's assignees
    Unassign {
        repo: String,
        number: u64,
        user: String,
    },

    /// Flag a pull request as done or deferred in the local list
    #[command(group(ArgGroup::new("flag").required(true).args(["done", "defer", "clear"])))]
    Mark {
        repo: String,
        number: u64,
        #[arg(long)]
        done: bool,
        #[arg(long)]
        defer: bool,
        #[arg(long)]
        clear: bool,
    },

    /// List repository contributors
    Contributors { repo: String },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;
    let mut prefs = Preferences::new(JsonFileStore::open(&config.prefs_path())?);

    if cli.forget_token {
        prefs.forget_token()?;
        info!("forgot remembered token");
    }
    let token = config.github_token(cli.token.as_deref(), prefs.remembered_token());
    if cli.remember_token {
        match &token {
            Some(token) => prefs.remember_token(token)?,
            None => warn!("--remember-token given but no token was resolved"),
        }
    }
    debug!(authenticated = token.is_some(), api_base = config.api_base(), "client ready");
    let client = GitHubClient::new(config.api_base(), token);
    let output = cli.output.as_deref();

    match cli.command {
        Command::Timeline {
            target,
            number,
            r#mock,
            full,
        } => {
            let report = if r#mock {
                info!("using mock PR data for demo");
                build_mock_timeline(full)?
            } else {
                let target = target.as_deref().ok_or(
                    "a PR URL or owner/repo is required unless --mock is used. \
                     Usage: pr-review-timeline timeline <URL> | <owner/repo> <number>",
                )?;
                let pr = resolve_pr_ref(target, number)?;
                build_timeline_report(&client, &pr, full)
                    .instrument(info_span!("timeline", repo = %pr.repo, pr = pr.number))
                    .await?
            };
            report::output(&report, output)?;
        }
        Command::Dashboard {
            repo,
            state,
            author,
            search,
            page,
            show_closed,
            hide_closed,
            trends,
            watch,
        } => {
            let repo = github::parse_repo(&repo)?;
            let toggle = (show_closed || hide_closed).then_some(show_closed);
            let repo_prefs = match toggle {
                Some(show) => prefs.update_repo(&repo, |p| p.show_closed = show)?,
                None => prefs.repo(&repo),
            };
            let filter = PrFilter {
                state,
                show_closed: repo_prefs.show_closed,
                author,
                search,
            };
            let view = DashboardView {
                repo,
                filter,
                page,
                trends,
            };
            run_dashboard(&client, &config, &prefs, &view, watch, output).await?;
        }
        Command::Assign { repo, number, user } => {
            let pr = PrRef {
                repo: github::parse_repo(&repo)?,
                number,
            };
            client.assign(&pr, &user).await?;
            prefs.update_repo(&pr.repo, |p| {
                p.assigned.insert(number, user.clone());
            })?;
            info!(pr = number, user = %user, "assigned");
            println!("Assigned {user} to {}#{number}", pr.repo);
        }
        Command::Unassign { repo, number, user } => {
            let pr = PrRef {
                repo: github::parse_repo(&repo)?,
                number,
            };
            client.unassign(&pr, &user).await?;
            prefs.update_repo(&pr.repo, |p| {
                if p.assigned.get(&number) == Some(&user) {
                    p.assigned.remove(&number);
                }
            })?;
            info!(pr = number, user = %user, "unassigned");
            println!("Unassigned {user} from {}#{number}", pr.repo);
        }
        Command::Mark {
            repo,
            number,
            done,
            defer,
            clear: _,
        } => {
            let repo = github::parse_repo(&repo)?;
            let mark = if done {
                Mark::Done
            } else if defer {
                Mark::Deferred
            } else {
                Mark::Clear
            };
            prefs.update_repo(&repo, |p| p.mark(number, mark))?;
            println!("{repo}#{number}: {mark:?}");
        }
        Command::Contributors { repo } => {
            let repo = github::parse_repo(&repo)?;
            let contributors = match client.contributors(&repo).await {
                Ok(contributors) => contributors,
                Err(e) => {
                    warn!(error = %e, "contributor list unavailable");
                    Vec::new()
                }
            };
            let report = Report::Contributors(ContributorsReport { repo, contributors });
            report::output(&report, output)?;
        }
    }

    Ok(())
}

/// Accept either a PR URL or `owner/repo` plus a number.
fn resolve_pr_ref(target: &str, number: Option<u64>) -> AppResult<PrRef> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(github::parse_pr_url(target)?);
    }
    let repo = github::parse_repo(target)?;
    let number = number.ok_or("a PR number is required after owner/repo")?;
    Ok(PrRef { repo, number })
}

async fn build_timeline_report(
    client: &GitHubClient,
    pr: &PrRef,
    full_bodies: bool,
) -> AppResult<Report> {
    info!("fetching timeline from GitHub");
    let (pull, timeline) = timeline::fetch_timeline(client, pr).await?;
    info!(events = timeline.len(), "built timeline");
    let now = Utc::now();
    Ok(Report::Timeline(TimelineReport {
        repo: pr.repo.clone(),
        number: pr.number,
        title: pull.title,
        metrics: timeline::review_metrics(&timeline, now),
        timeline,
        full_bodies,
        generated_at: now,
    }))
}

/// Build a timeline report from the embedded sample PR fixture.
/// This runs the full timeline pipeline without a GitHub token.
fn build_mock_timeline(full_bodies: bool) -> AppResult<Report> {
    let raw = include_str!("../tests/fixtures/mock_timeline.json");
    let sources: timeline::TimelineSources = serde_json::from_str(raw)?;
    let now = Utc::now();
    let built = timeline::build_timeline(&sources, now);
    Ok(Report::Timeline(TimelineReport {
        repo: RepoRef {
            owner: "octo-org".to_string(),
            repo: "auth-service".to_string(),
        },
        number: sources.pull.number,
        title: sources.pull.title.clone(),
        metrics: timeline::review_metrics(&built, now),
        timeline: built,
        full_bodies,
        generated_at: now,
    }))
}

struct DashboardView {
    repo: RepoRef,
    filter: PrFilter,
    page: usize,
    trends: bool,
}

/// Render the dashboard once, or repeatedly with `watch`. The status cache
/// survives between polls so unchanged head commits are not re-checked.
async fn run_dashboard(
    client: &GitHubClient,
    config: &Config,
    prefs: &Preferences<JsonFileStore>,
    view: &DashboardView,
    watch: Option<u64>,
    output: Option<&std::path::Path>,
) -> AppResult<()> {
    let mut cache = StatusCache::new();
    cache.set_repository(&view.repo);

    loop {
        let report = build_dashboard_report(client, config, prefs, view, &mut cache)
            .instrument(info_span!("dashboard", repo = %view.repo))
            .await?;
        report::output(&report, output)?;

        let Some(secs) = watch else {
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping watch");
                return Ok(());
            }
        }
    }
}

async fn build_dashboard_report(
    client: &GitHubClient,
    config: &Config,
    prefs: &Preferences<JsonFileStore>,
    view: &DashboardView,
    cache: &mut StatusCache,
) -> AppResult<Report> {
    let settings = &config.dashboard;
    let repo = &view.repo;

    info!("fetching pull requests and workflow runs");
    let trend_days = settings.trend_months * 31;
    let (prs, runs, trend_prs) = tokio::join!(
        client.recent_pull_requests(repo, settings.list_days),
        client.workflow_runs(repo, settings.metrics_days),
        async {
            if view.trends {
                Some(client.recent_pull_requests(repo, trend_days).await)
            } else {
                None
            }
        },
    );
    let prs = prs?;
    info!(prs = prs.len(), "fetched pull requests");

    let today = Local::now().date_naive();
    let builds = match runs {
        Ok(runs) => Some(metrics::build_metrics(&runs, today, settings.metrics_days, &Local)),
        Err(e) => {
            warn!(error = %e, "build metrics unavailable");
            None
        }
    };
    let trends = match trend_prs {
        Some(Ok(trend_prs)) => Some(metrics::monthly_trends(
            &trend_prs,
            today,
            settings.trend_months,
            &Local,
        )),
        Some(Err(e)) => {
            warn!(error = %e, "trends unavailable");
            None
        }
        None => None,
    };

    let visible = pulls::filter_prs(&prs, &view.filter);
    let page = pulls::paginate(visible, view.page, settings.per_page);

    let fetched = cache.refresh(client, page.items.iter().copied()).await;
    debug!(fetched, cached = cache.len(), "build statuses refreshed");

    let repo_prefs = prefs.repo(repo);
    let statuses = cache.snapshot();
    let rows = pulls::Page {
        items: page
            .items
            .iter()
            .map(|pr| PrRow {
                number: pr.number,
                title: pr.title.clone(),
                author: pr.author().map(str::to_string),
                created_at: pr.created_at,
                state: PrState::of(pr),
                build: pr
                    .head_sha()
                    .and_then(|sha| statuses.get(&pr.number).filter(|c| c.sha == sha))
                    .map_or(BuildStatus::Unknown, |c| c.status),
                done: repo_prefs.completed.contains(&pr.number),
                deferred: repo_prefs.deferred.contains(&pr.number),
                assignee: repo_prefs
                    .assigned
                    .get(&pr.number)
                    .cloned()
                    .or_else(|| pr.assignees.first().map(|u| u.login.clone())),
            })
            .collect(),
        page: page.page,
        total_pages: page.total_pages,
        total_items: page.total_items,
    };

    Ok(Report::Dashboard(DashboardReport {
        repo: repo.clone(),
        list_days: settings.list_days,
        summary: metrics::summarize(&prs),
        metrics_days: settings.metrics_days,
        builds,
        trends,
        rows,
        generated_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::EventKind;

    #[test]
    fn test_resolve_pr_ref_from_url() {
        let pr = resolve_pr_ref("https://github.com/org/repo/pull/42", None).unwrap();
        assert_eq!(pr.repo.to_string(), "org/repo");
        assert_eq!(pr.number, 42);
    }

    #[test]
    fn test_resolve_pr_ref_from_repo_and_number() {
        let pr = resolve_pr_ref("org/repo", Some(7)).unwrap();
        assert_eq!(pr.number, 7);
        assert!(resolve_pr_ref("org/repo", None).is_err());
    }

    #[test]
    fn test_mock_timeline_builds() {
        let Report::Timeline(report) = build_mock_timeline(false).unwrap() else {
            panic!("expected a timeline report");
        };
        assert_eq!(report.number, 42);
        let events = report.timeline.events();
        assert!(matches!(events[0].kind, EventKind::Opened { .. }));
        assert!(matches!(events.last().unwrap().kind, EventKind::Merged { .. }));
        assert!(events.windows(2).all(|w| w[0].at <= w[1].at));
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.time_to_first_review, Some(5));
        assert_eq!(metrics.time_to_approval, Some(26));
    }

    #[test]
    fn test_cli_parses_dashboard_flags() {
        let cli = Cli::try_parse_from([
            "pr-review-timeline",
            "dashboard",
            "org/repo",
            "--state",
            "merged",
            "--page",
            "2",
            "--trends",
        ])
        .unwrap();
        match cli.command {
            Command::Dashboard {
                state, page, trends, ..
            } => {
                assert_eq!(state, StateFilter::Merged);
                assert_eq!(page, 2);
                assert!(trends);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_mark_requires_a_flag() {
        assert!(Cli::try_parse_from(["pr-review-timeline", "mark", "org/repo", "3"]).is_err());
        assert!(Cli::try_parse_from(["pr-review-timeline", "mark", "org/repo", "3", "--done"]).is_ok());
    }
}
