//! Plain-text rendering of pages and grouped views

use std::fmt::Write;

use harvest_core::{
    listing_area, listing_price, DateBucket, FilterBounds, GroupedView, Listing, ListingGroup, CRORE,
};

/// One listing on one line
pub fn listing_line(listing: &Listing) -> String {
    let score = listing
        .relevance_score
        .map_or_else(|| "  - ".to_string(), |s| format!("{s:>4.1}"));

    let price = listing_price(listing);
    let price = if price > 0.0 {
        format!("{:.2} Cr", price / CRORE)
    } else {
        "-".to_string()
    };

    let area = listing_area(listing);
    let area = if area > 0.0 {
        format!("{area:.0} sqft")
    } else {
        "-".to_string()
    };

    format!("[{score}] {:<48} {price:>10} {area:>11}", truncate(&listing.title, 48))
}

/// A local page with a header
pub fn page(number: usize, items: &[Listing]) -> String {
    let mut out = format!("── Page {number} ({} listings) ──\n", items.len());
    for listing in items {
        let _ = writeln!(out, "{}", listing_line(listing));
    }
    out
}

/// Price and area bounds
pub fn bounds(bounds: &FilterBounds) -> String {
    format!(
        "Price: {}-{} Cr   Area: {}-{} sqft\n",
        bounds.price.min, bounds.price.max, bounds.area.min, bounds.area.max
    )
}

/// Both relevance groups
pub fn grouped_view(view: &GroupedView, threshold: f64) -> String {
    let mut out = String::new();
    group(&mut out, &format!("Relevance {threshold} and above"), &view.meets_threshold);
    group(&mut out, &format!("Below {threshold}"), &view.below_threshold);
    out
}

fn group(out: &mut String, title: &str, group: &ListingGroup) {
    let _ = writeln!(out, "\n{title} ({})", group.len());
    match group.by_date {
        Some(ref buckets) => {
            for bucket in DateBucket::ALL {
                let Some(items) = buckets.get(&bucket) else {
                    continue;
                };
                let _ = writeln!(out, "  {bucket}");
                for listing in items {
                    let _ = writeln!(out, "    {}", listing_line(listing));
                }
            }
        }
        None => {
            for listing in &group.items {
                let _ = writeln!(out, "  {}", listing_line(listing));
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
