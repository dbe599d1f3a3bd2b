//! Posted-date buckets
//!
//! Listings carry free-text dates ("3 hours ago", "Posted yesterday",
//! "12 October"). They are classified heuristically relative to a given
//! day; anything unrecognised lands in [`DateBucket::PreviousMonths`].

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

/// Recency bucket for a posted date, ordered newest first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DateBucket {
    /// Posted today
    Today,
    /// Posted within the last week
    ThisWeek,
    /// Posted earlier this calendar month
    ThisMonth,
    /// Older, or unrecognised
    PreviousMonths,
}

impl DateBucket {
    /// All buckets in display order
    pub const ALL: [DateBucket; 4] = [
        DateBucket::Today,
        DateBucket::ThisWeek,
        DateBucket::ThisMonth,
        DateBucket::PreviousMonths,
    ];

    /// Human-readable heading
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            DateBucket::Today => "Today",
            DateBucket::ThisWeek => "This Week",
            DateBucket::ThisMonth => "This Month",
            DateBucket::PreviousMonths => "Previous Months",
        }
    }
}

impl std::fmt::Display for DateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a free-text posted date relative to `today`
#[must_use]
pub fn classify_posted_date(text: &str, today: NaiveDate) -> DateBucket {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return DateBucket::PreviousMonths;
    }

    if ["hour", "minute", "today", "just now"]
        .iter()
        .any(|marker| lower.contains(marker))
    {
        return DateBucket::Today;
    }

    if lower.contains("yesterday") {
        return DateBucket::ThisWeek;
    }

    if let Some(days) = count_before(&lower, "day") {
        if days <= 7 {
            return DateBucket::ThisWeek;
        }
    }

    let month = today.format("%B").to_string().to_lowercase();
    if lower.contains(&month) {
        return DateBucket::ThisMonth;
    }

    if let Some(weeks) = count_before(&lower, "week") {
        let then = today.checked_sub_days(Days::new(7 * u64::from(weeks)));
        if then.is_some_and(|then| then.month() == today.month() && then.year() == today.year()) {
            return DateBucket::ThisMonth;
        }
    }

    if lower.contains("ago") {
        tracing::debug!(posted = text, "Relative date outside recent buckets");
    }
    DateBucket::PreviousMonths
}

/// Count written immediately before `unit`, e.g. `3` in "3 days ago".
/// "a day ago" counts as 1. Every occurrence of `unit` is tried, so a
/// weekday name ahead of the count does not hide it.
fn count_before(text: &str, unit: &str) -> Option<u32> {
    text.match_indices(unit).find_map(|(idx, _)| {
        let before = text[..idx].trim_end();

        let digit_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i);
        if let Some(start) = digit_start {
            return before[start..].parse().ok();
        }

        let word = before.rsplit(char::is_whitespace).next().unwrap_or_default();
        matches!(word, "a" | "an" | "one").then_some(1)
    })
}
