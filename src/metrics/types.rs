use chrono::{Duration, NaiveDate};

/// Headline numbers for a set of pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSummary {
    pub total: usize,
    pub open: usize,
    pub merged: usize,
    /// Closed without being merged
    pub closed: usize,
    /// Mean created→merged time; `None` when nothing was merged
    pub avg_time_to_merge: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetrics {
    pub per_day: Vec<DayBucket>,
    /// Mean duration of completed runs; `None` when there are none
    pub avg_duration: Option<Duration>,
}

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    /// 1-based
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month `n` months before this one.
    pub fn minus(self, n: u32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) - n as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Short label such as "Apr 25".
    pub fn label(self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%b %y").to_string())
            .unwrap_or_else(|| self.to_string())
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub month: MonthKey,
    /// PRs created in this month
    pub pr_count: usize,
    /// Mean merge time (days, one decimal) of PRs merged in this month
    pub avg_merge_days: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_key_display_and_label() {
        let key = MonthKey { year: 2025, month: 4 };
        assert_eq!(key.to_string(), "2025-04");
        assert_eq!(key.label(), "Apr 25");
    }

    #[test]
    fn test_month_key_minus_crosses_year() {
        let key = MonthKey { year: 2025, month: 2 };
        assert_eq!(key.minus(0), key);
        assert_eq!(key.minus(2), MonthKey { year: 2024, month: 12 });
        assert_eq!(key.minus(14), MonthKey { year: 2023, month: 12 });
    }
}
