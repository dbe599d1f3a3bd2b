//! Filter and Group Engine
//!
//! Derives the displayed view from the accumulated set:
//!
//! ```text
//!  accumulated ──▶ text / price / area filter ──▶ split on relevance
//!                                                   │
//!                          ┌────────────────────────┴──────────┐
//!                          ▼                                   ▼
//!                   meets threshold                     below threshold
//!                (sorted by score desc)              (sorted by score desc)
//!                          │                                   │
//!                          └──── optional date buckets ────────┘
//! ```
//!
//! Prices are compared in crore, areas in square feet. Range bounds are
//! recomputed from the data as it grows; see [`FilterState::reconcile`].

mod dates;
mod price;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::listing::Listing;

pub use dates::{classify_posted_date, DateBucket};
pub use price::{extract_area, extract_price, listing_area, listing_price, CRORE, LAKH};

/// Default price range, in crore
pub const DEFAULT_PRICE_BOUNDS: Bounds = Bounds { min: 0.0, max: 10.0 };

/// Default area range, in square feet
pub const DEFAULT_AREA_BOUNDS: Bounds = Bounds {
    min: 0.0,
    max: 10_000.0,
};

/// Default relevance threshold
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 7.0;

/// Sort key for listings without a relevance score
const MISSING_SCORE: f64 = -1.0;

// ============================================================================
// Bounds
// ============================================================================

/// Inclusive numeric range
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bounds {
    /// Lower end
    pub min: f64,
    /// Upper end
    pub max: f64,
}

impl Bounds {
    /// Create a range
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies within the range
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Smallest range covering both
    fn widen(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Price and area ranges observed in the accumulated set
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FilterBounds {
    /// Price range in crore
    pub price: Bounds,
    /// Area range in square feet
    pub area: Bounds,
}

impl Default for FilterBounds {
    fn default() -> Self {
        Self {
            price: DEFAULT_PRICE_BOUNDS,
            area: DEFAULT_AREA_BOUNDS,
        }
    }
}

/// Compute price and area bounds over `items`.
///
/// Zero (unparseable) values are excluded. Bounds are floored and ceiled
/// to whole units and never narrower than the defaults.
#[must_use]
pub fn compute_bounds(items: &[Listing]) -> FilterBounds {
    let price = observed(items.iter().map(|l| listing_price(l) / CRORE))
        .map_or(DEFAULT_PRICE_BOUNDS, |b| b.widen(DEFAULT_PRICE_BOUNDS));
    let area = observed(items.iter().map(listing_area))
        .map_or(DEFAULT_AREA_BOUNDS, |b| b.widen(DEFAULT_AREA_BOUNDS));
    FilterBounds { price, area }
}

fn observed(values: impl Iterator<Item = f64>) -> Option<Bounds> {
    values
        .filter(|v| *v > 0.0)
        .fold(None, |acc: Option<Bounds>, v| {
            Some(match acc {
                Some(b) => Bounds::new(b.min.min(v), b.max.max(v)),
                None => Bounds::new(v, v),
            })
        })
        .map(|b| Bounds::new(b.min.floor(), b.max.ceil()))
}

// ============================================================================
// Filter state
// ============================================================================

/// User-controlled filter settings
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Case-insensitive substring matched against title or description
    pub text: String,
    /// Price range in crore
    pub price_range: Bounds,
    /// Area range in square feet
    pub area_range: Bounds,
    /// Minimum score for the primary group
    pub relevance_threshold: f64,
    /// Bucket each group by posted date
    pub group_by_date: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_THRESHOLD)
    }
}

impl FilterState {
    /// Default filters with the given relevance threshold
    #[must_use]
    pub fn new(relevance_threshold: f64) -> Self {
        Self {
            text: String::new(),
            price_range: DEFAULT_PRICE_BOUNDS,
            area_range: DEFAULT_AREA_BOUNDS,
            relevance_threshold,
            group_by_date: false,
        }
    }

    /// Set the text filter
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the price range (crore)
    #[must_use]
    pub fn with_price_range(mut self, min: f64, max: f64) -> Self {
        self.price_range = Bounds::new(min, max);
        self
    }

    /// Set the area range (square feet)
    #[must_use]
    pub fn with_area_range(mut self, min: f64, max: f64) -> Self {
        self.area_range = Bounds::new(min, max);
        self
    }

    /// Enable or disable date grouping
    #[must_use]
    pub fn with_group_by_date(mut self, enabled: bool) -> Self {
        self.group_by_date = enabled;
        self
    }

    /// Follow recomputed bounds for any range the user has not narrowed.
    ///
    /// A range is untouched while its upper end still sits at the default
    /// upper bound or at the bound last assigned from data (`previous`).
    /// Returns `true` if either range changed.
    pub fn reconcile(&mut self, previous: &FilterBounds, next: &FilterBounds) -> bool {
        let price = follow(&mut self.price_range, DEFAULT_PRICE_BOUNDS, previous.price, next.price);
        let area = follow(&mut self.area_range, DEFAULT_AREA_BOUNDS, previous.area, next.area);
        price || area
    }
}

#[allow(clippy::float_cmp)]
fn follow(range: &mut Bounds, default: Bounds, previous: Bounds, next: Bounds) -> bool {
    let untouched = range.max == default.max || range.max == previous.max;
    if untouched && *range != next {
        *range = next;
        true
    } else {
        false
    }
}

// ============================================================================
// Grouped view
// ============================================================================

/// One relevance group, optionally bucketed by posted date
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingGroup {
    /// Listings sorted by relevance, highest first
    pub items: Vec<Listing>,
    /// The same listings bucketed by posted date, when grouping is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_date: Option<BTreeMap<DateBucket, Vec<Listing>>>,
}

impl ListingGroup {
    /// Number of listings in the group
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the group is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Filtered listings split on the relevance threshold
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedView {
    /// Score at or above the threshold
    pub meets_threshold: ListingGroup,
    /// Score below the threshold, or no score
    pub below_threshold: ListingGroup,
}

impl GroupedView {
    /// Listings across both groups
    #[must_use]
    pub fn total(&self) -> usize {
        self.meets_threshold.len() + self.below_threshold.len()
    }

    /// Whether nothing passed the filters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Filter `items`, split on relevance and optionally group by date.
///
/// Dates are bucketed relative to `today`.
#[must_use]
pub fn apply(items: &[Listing], state: &FilterState, today: NaiveDate) -> GroupedView {
    let needle = state.text.trim().to_lowercase();

    let (mut meets, mut below): (Vec<Listing>, Vec<Listing>) = items
        .iter()
        .filter(|l| matches_text(l, &needle))
        .filter(|l| state.price_range.contains(listing_price(l) / CRORE))
        .filter(|l| state.area_range.contains(listing_area(l)))
        .cloned()
        .partition(|l| l.relevance_score.unwrap_or(0.0) >= state.relevance_threshold);

    sort_by_relevance(&mut meets);
    sort_by_relevance(&mut below);

    GroupedView {
        meets_threshold: group(meets, state.group_by_date, today),
        below_threshold: group(below, state.group_by_date, today),
    }
}

fn matches_text(listing: &Listing, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    listing.title.to_lowercase().contains(needle)
        || listing
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}

/// Stable sort, highest score first
fn sort_by_relevance(items: &mut [Listing]) {
    items.sort_by(|a, b| {
        let a = a.relevance_score.unwrap_or(MISSING_SCORE);
        let b = b.relevance_score.unwrap_or(MISSING_SCORE);
        b.partial_cmp(&a).unwrap_or(Ordering::Equal)
    });
}

fn group(items: Vec<Listing>, by_date: bool, today: NaiveDate) -> ListingGroup {
    let by_date = by_date.then(|| {
        let mut buckets: BTreeMap<DateBucket, Vec<Listing>> = BTreeMap::new();
        for item in &items {
            let bucket = classify_posted_date(item.posted_date.as_deref().unwrap_or_default(), today);
            buckets.entry(bucket).or_default().push(item.clone());
        }
        buckets
    });
    ListingGroup { items, by_date }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 19).unwrap()
    }

    fn listing(key: &str, score: Option<f64>) -> Listing {
        let mut l = Listing::new(key, key);
        l.relevance_score = score;
        l
    }

    fn keys(items: &[Listing]) -> Vec<String> {
        items.iter().map(Listing::key).map(str::to_string).collect()
    }

    #[test]
    fn test_split_and_sort() {
        let items = vec![
            listing("a", Some(6.0)),
            listing("b", Some(9.0)),
            listing("c", None),
            listing("d", Some(7.0)),
            listing("e", Some(8.5)),
        ];
        let view = apply(&items, &FilterState::new(7.0), today());

        assert_eq!(keys(&view.meets_threshold.items), vec!["b", "e", "d"]);
        assert_eq!(keys(&view.below_threshold.items), vec!["a", "c"]);
        assert!(view.meets_threshold.by_date.is_none());
        assert_eq!(view.total(), 5);
    }

    #[test]
    fn test_text_filter() {
        let items = vec![
            Listing::new("1", "Sea facing 3BHK").with_description("Bandra west"),
            Listing::new("2", "Garden villa").with_description("Quiet lane near the SEA"),
            Listing::new("3", "Studio"),
        ];
        let state = FilterState::new(0.0).with_text("  Sea ");
        let view = apply(&items, &state, today());
        assert_eq!(view.total(), 2);
    }

    #[test]
    fn test_price_and_area_filters() {
        let items = vec![
            Listing::new("cheap", "t").with_price("50 L").with_area("900 sqft"),
            Listing::new("mid", "t").with_price("₹2.5 Cr").with_area("1,800 sqft"),
            Listing::new("dear", "t").with_price("₹12 Cr").with_area("4,000 sqft"),
            Listing::new("unknown", "t").with_price("On request"),
        ];

        let state = FilterState::new(0.0).with_price_range(1.0, 5.0);
        let view = apply(&items, &state, today());
        assert_eq!(keys(&view.meets_threshold.items), vec!["mid"]);

        // Unparseable prices count as zero and pass a range starting at 0
        let state = FilterState::new(0.0).with_area_range(0.0, 1000.0);
        let view = apply(&items, &state, today());
        assert_eq!(keys(&view.meets_threshold.items), vec!["cheap", "unknown"]);
    }

    #[test]
    fn test_group_by_date_preserves_relevance_order() {
        let items = vec![
            listing("old", Some(9.0)).with_posted_date("3 months ago"),
            listing("new-low", Some(7.5)).with_posted_date("2 hours ago"),
            listing("new-high", Some(9.5)).with_posted_date("today"),
        ];
        let state = FilterState::new(7.0).with_group_by_date(true);
        let view = apply(&items, &state, today());

        let buckets = view.meets_threshold.by_date.unwrap();
        assert_eq!(keys(&buckets[&DateBucket::Today]), vec!["new-high", "new-low"]);
        assert_eq!(keys(&buckets[&DateBucket::PreviousMonths]), vec!["old"]);
        assert!(!buckets.contains_key(&DateBucket::ThisWeek));
    }

    #[test]
    fn test_bounds_from_data() {
        let items = vec![
            Listing::new("a", "t").with_price("₹14.2 Cr").with_area("12,500 sqft"),
            Listing::new("b", "t").with_price("₹1.3 Cr").with_area("950 sqft"),
            Listing::new("c", "t").with_price("garbage"),
        ];
        let bounds = compute_bounds(&items);
        assert_eq!(bounds.price, Bounds::new(0.0, 15.0));
        assert_eq!(bounds.area, Bounds::new(0.0, 12_500.0));
    }

    #[test]
    fn test_bounds_never_narrower_than_defaults() {
        let items = vec![Listing::new("a", "t").with_price("50 L").with_area("700 sqft")];
        assert_eq!(compute_bounds(&items), FilterBounds::default());
        assert_eq!(compute_bounds(&[]), FilterBounds::default());
    }

    #[test]
    fn test_reconcile_follows_untouched_ranges() {
        let mut state = FilterState::default();
        let initial = FilterBounds::default();
        let grown = FilterBounds {
            price: Bounds::new(0.0, 25.0),
            area: Bounds::new(0.0, 10_000.0),
        };

        assert!(state.reconcile(&initial, &grown));
        assert_eq!(state.price_range, Bounds::new(0.0, 25.0));

        // Still tracking the last assigned bound
        let grown_more = FilterBounds {
            price: Bounds::new(0.0, 40.0),
            ..grown
        };
        assert!(state.reconcile(&grown, &grown_more));
        assert_eq!(state.price_range.max, 40.0);
    }

    #[test]
    fn test_reconcile_keeps_narrowed_ranges() {
        let mut state = FilterState::default().with_price_range(1.0, 3.0);
        let grown = FilterBounds {
            price: Bounds::new(0.0, 25.0),
            area: Bounds::new(0.0, 20_000.0),
        };

        assert!(state.reconcile(&FilterBounds::default(), &grown));
        assert_eq!(state.price_range, Bounds::new(1.0, 3.0));
        assert_eq!(state.area_range, Bounds::new(0.0, 20_000.0));
    }
}
