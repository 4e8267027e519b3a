use chrono::{DateTime, Utc};

/// Review verdict as reported by GitHub. Unrecognised values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Other(String),
}

impl ReviewState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "COMMENTED" => ReviewState::Commented,
            "DISMISSED" => ReviewState::Dismissed,
            other => ReviewState::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewState::Approved => write!(f, "APPROVED"),
            ReviewState::ChangesRequested => write!(f, "CHANGES_REQUESTED"),
            ReviewState::Commented => write!(f, "COMMENTED"),
            ReviewState::Dismissed => write!(f, "DISMISSED"),
            ReviewState::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// What happened at one point of a PR's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Opened {
        by: Option<String>,
    },
    ReviewRequested {
        by: Option<String>,
        /// Requested reviewer login or team name
        to: Option<String>,
    },
    Review {
        by: Option<String>,
        state: Option<ReviewState>,
        body: Option<String>,
    },
    Comment {
        by: Option<String>,
        body: Option<String>,
    },
    Merged {
        by: Option<String>,
    },
    Closed {
        by: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl TimelineEvent {
    pub fn actor(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Opened { by }
            | EventKind::ReviewRequested { by, .. }
            | EventKind::Review { by, .. }
            | EventKind::Comment { by, .. }
            | EventKind::Merged { by }
            | EventKind::Closed { by } => by.as_deref(),
        }
    }

    pub fn body(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Review { body, .. } | EventKind::Comment { body, .. } => body.as_deref(),
            EventKind::Opened { .. }
            | EventKind::ReviewRequested { .. }
            | EventKind::Merged { .. }
            | EventKind::Closed { .. } => None,
        }
    }

    /// Short human label, e.g. "Review requested → bob" or "Approved".
    pub fn label(&self) -> String {
        match &self.kind {
            EventKind::Opened { .. } => "PR opened".to_string(),
            EventKind::ReviewRequested { to: Some(to), .. } => format!("Review requested → {to}"),
            EventKind::ReviewRequested { to: None, .. } => "Review requested".to_string(),
            EventKind::Review { state, .. } => match state {
                Some(ReviewState::Approved) => "Approved".to_string(),
                Some(ReviewState::ChangesRequested) => "Changes requested".to_string(),
                _ => "Reviewed".to_string(),
            },
            EventKind::Comment { .. } => "Comment".to_string(),
            EventKind::Merged { .. } => "Merged".to_string(),
            EventKind::Closed { .. } => "Closed".to_string(),
        }
    }
}

/// Chronologically ordered, read-only view of a PR's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
}

impl Timeline {
    /// Sorts by timestamp; the sort is stable so ties keep their input order.
    pub fn from_events(mut events: Vec<TimelineEvent>) -> Self {
        events.sort_by_key(|e| e.at);
        Self { events }
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// How a PR ended up, as seen from its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Open,
    Merged,
    Closed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Open => write!(f, "open"),
            Outcome::Merged => write!(f, "merged"),
            Outcome::Closed => write!(f, "closed"),
        }
    }
}

/// Review latency figures, in whole hours since the PR was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewMetrics {
    pub time_to_first_review: Option<i64>,
    pub time_to_approval: Option<i64>,
    pub total_time: i64,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_review_state_round_trips_unknown_values() {
        assert_eq!(ReviewState::parse("APPROVED"), ReviewState::Approved);
        let other = ReviewState::parse("PENDING");
        assert_eq!(other, ReviewState::Other("PENDING".to_string()));
        assert_eq!(other.to_string(), "PENDING");
    }

    #[test]
    fn test_labels() {
        let requested = TimelineEvent {
            at: at(1),
            kind: EventKind::ReviewRequested {
                by: Some("alice".to_string()),
                to: Some("bob".to_string()),
            },
        };
        assert_eq!(requested.label(), "Review requested → bob");

        let changes = TimelineEvent {
            at: at(2),
            kind: EventKind::Review {
                by: Some("bob".to_string()),
                state: Some(ReviewState::ChangesRequested),
                body: None,
            },
        };
        assert_eq!(changes.label(), "Changes requested");
        assert_eq!(changes.actor(), Some("bob"));
    }

    #[test]
    fn test_from_events_is_stable_on_ties() {
        let first = TimelineEvent {
            at: at(3),
            kind: EventKind::Comment {
                by: Some("a".to_string()),
                body: None,
            },
        };
        let second = TimelineEvent {
            at: at(3),
            kind: EventKind::Comment {
                by: Some("b".to_string()),
                body: None,
            },
        };
        let opened = TimelineEvent {
            at: at(1),
            kind: EventKind::Opened { by: None },
        };
        let timeline = Timeline::from_events(vec![first.clone(), second.clone(), opened.clone()]);
        assert_eq!(timeline.events(), &[opened, first, second]);
    }
}
