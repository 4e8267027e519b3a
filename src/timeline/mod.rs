pub mod types;

pub use types::{EventKind, Outcome, ReviewMetrics, ReviewState, Timeline, TimelineEvent};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::github::types::{Comment, IssueEvent, Review};
use crate::github::{GitHubClient, GitHubError, PrRef, PullRequest};

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error(transparent)]
    Fetch(#[from] GitHubError),
}

/// Raw sub-resources of one pull request, as fetched from GitHub.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TimelineSources {
    pub pull: PullRequest,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub events: Vec<IssueEvent>,
    #[serde(default)]
    pub issue_comments: Vec<Comment>,
    #[serde(default)]
    pub review_comments: Vec<Comment>,
}

/// Fetch all sub-resources of a PR concurrently and merge them into a timeline.
///
/// The first failing request aborts the whole operation; there is no
/// partial result.
#[instrument(skip(client, pr), fields(repo = %pr.repo, pr = pr.number))]
pub async fn fetch_timeline(
    client: &GitHubClient,
    pr: &PrRef,
) -> Result<(PullRequest, Timeline), TimelineError> {
    let (pull, reviews, events, issue_comments, review_comments) = tokio::try_join!(
        client.pull_request(pr),
        client.reviews(pr),
        client.issue_events(pr),
        client.issue_comments(pr),
        client.review_comments(pr),
    )?;
    debug!(
        reviews = reviews.len(),
        events = events.len(),
        issue_comments = issue_comments.len(),
        review_comments = review_comments.len(),
        "fetched timeline sources"
    );

    let sources = TimelineSources {
        pull,
        reviews,
        events,
        issue_comments,
        review_comments,
    };
    let timeline = build_timeline(&sources, Utc::now());
    Ok((sources.pull, timeline))
}

/// Merge PR sub-resources into one chronologically ordered timeline.
///
/// `now` is the timestamp of last resort for reviews that carry none.
/// Issue comments and inline review comments are concatenated as-is, so a
/// record present in both streams would appear twice.
pub fn build_timeline(sources: &TimelineSources, now: DateTime<Utc>) -> Timeline {
    let pull = &sources.pull;
    let author = pull.author().map(str::to_string);
    let mut events = Vec::new();

    if let Some(created_at) = pull.created_at {
        events.push(TimelineEvent {
            at: created_at,
            kind: EventKind::Opened { by: author.clone() },
        });
    }

    for ev in sources.events.iter().filter(|ev| ev.event == "review_requested") {
        events.push(TimelineEvent {
            at: ev.created_at,
            kind: EventKind::ReviewRequested {
                by: ev.actor.as_ref().map(|u| u.login.clone()),
                to: ev
                    .requested_reviewer
                    .as_ref()
                    .map(|u| u.login.clone())
                    .or_else(|| ev.requested_team.as_ref().map(|t| t.name.clone())),
            },
        });
    }

    for review in &sources.reviews {
        let at = review
            .submitted_at
            .or(review.submitted_at_alt)
            .or(review.created_at)
            .unwrap_or(now);
        events.push(TimelineEvent {
            at,
            kind: EventKind::Review {
                by: review.user.as_ref().map(|u| u.login.clone()),
                state: review.state.as_deref().map(ReviewState::parse),
                body: review.body.clone(),
            },
        });
    }

    for comment in sources.issue_comments.iter().chain(&sources.review_comments) {
        events.push(TimelineEvent {
            at: comment.created_at,
            kind: EventKind::Comment {
                by: comment.user.as_ref().map(|u| u.login.clone()),
                body: comment.body.clone(),
            },
        });
    }

    if let Some(merged_at) = pull.merged_at {
        events.push(TimelineEvent {
            at: merged_at,
            kind: EventKind::Merged {
                by: pull.merged_by.as_ref().map(|u| u.login.clone()),
            },
        });
    } else if let Some(closed_at) = pull.closed_at {
        events.push(TimelineEvent {
            at: closed_at,
            kind: EventKind::Closed { by: author },
        });
    }

    Timeline::from_events(events)
}

/// Compute review latency from a built timeline. Returns `None` when the
/// timeline has no `opened` event. Open PRs are measured up to `now`.
pub fn review_metrics(timeline: &Timeline, now: DateTime<Utc>) -> Option<ReviewMetrics> {
    let mut opened = None;
    let mut first_review = None;
    let mut approved = None;
    let mut end = None;

    for event in timeline.events() {
        match &event.kind {
            EventKind::Opened { .. } => {
                opened.get_or_insert(event.at);
            }
            EventKind::Review { state, .. } => {
                first_review.get_or_insert(event.at);
                if state == &Some(ReviewState::Approved) {
                    approved.get_or_insert(event.at);
                }
            }
            EventKind::Merged { .. } => {
                end.get_or_insert((event.at, Outcome::Merged));
            }
            EventKind::Closed { .. } => {
                end.get_or_insert((event.at, Outcome::Closed));
            }
            EventKind::ReviewRequested { .. } | EventKind::Comment { .. } => {}
        }
    }

    let opened = opened?;
    let hours_since = |at: DateTime<Utc>| (at - opened).num_hours();
    let (end_at, outcome) = end.unwrap_or((now, Outcome::Open));

    Some(ReviewMetrics {
        time_to_first_review: first_review.map(hours_since),
        time_to_approval: approved.map(hours_since),
        total_time: hours_since(end_at),
        outcome,
    })
}
