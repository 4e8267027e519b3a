//! Filtering and paging of the recent pull request list.

use crate::github::PullRequest;

/// Display state of a PR: merged PRs are reported separately from closed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl PrState {
    pub fn of(pr: &PullRequest) -> Self {
        if pr.merged_at.is_some() {
            PrState::Merged
        } else if pr.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Merged => write!(f, "merged"),
            PrState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StateFilter {
    #[default]
    All,
    Open,
    Merged,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct PrFilter {
    pub state: StateFilter,
    /// When false, closed and merged PRs are hidden unless `state` asks for them
    pub show_closed: bool,
    pub author: Option<String>,
    /// Case-insensitive match against the title or `#number`
    pub search: Option<String>,
}

impl PrFilter {
    pub fn matches(&self, pr: &PullRequest) -> bool {
        let state = PrState::of(pr);
        let state_ok = match self.state {
            StateFilter::All => self.show_closed || state == PrState::Open,
            StateFilter::Open => state == PrState::Open,
            StateFilter::Merged => state == PrState::Merged,
            StateFilter::Closed => state == PrState::Closed,
        };
        let author_ok = self
            .author
            .as_deref()
            .map_or(true, |a| pr.author().is_some_and(|login| login.eq_ignore_ascii_case(a)));
        let search_ok = self.search.as_deref().map_or(true, |needle| {
            let needle = needle.to_lowercase();
            pr.title.to_lowercase().contains(&needle) || format!("#{}", pr.number) == needle
        });
        state_ok && author_ok && search_ok
    }
}

/// Apply `filter` and order newest first.
pub fn filter_prs<'a>(prs: &'a [PullRequest], filter: &PrFilter) -> Vec<&'a PullRequest> {
    let mut items: Vec<&PullRequest> = prs.iter().filter(|pr| filter.matches(pr)).collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice `items` into pages of `per_page`; `page` is clamped into range.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    Page {
        items,
        page,
        total_pages,
        total_items,
    }
}
