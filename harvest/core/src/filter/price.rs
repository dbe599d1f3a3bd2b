//! Numeric extraction from free-text price and area fields

use crate::listing::{FieldValue, Listing};

/// Rupees in one crore
pub const CRORE: f64 = 10_000_000.0;
/// Rupees in one lakh
pub const LAKH: f64 = 100_000.0;

/// Parse a price such as `"₹5.34 Cr"`, `"50 L"` or `"₹50,000"` into rupees.
///
/// Crore and lakh suffixes scale the first number; anything else is taken
/// as plain currency after stripping symbols and thousands separators.
/// Unparseable text yields 0.
#[must_use]
pub fn extract_price(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let Some((value, rest)) = leading_number(&lower) else {
        return 0.0;
    };

    // The word right after the number, e.g. "cr" in "5.34cr" or "5.34 Cr."
    let suffix = rest.trim_start();
    let next_word = &suffix[..suffix
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(suffix.len())];

    let multiplier = unit_multiplier(next_word)
        .or_else(|| {
            // Ranges like "1.2 - 1.5 Cr" carry the unit only at the end.
            // Single letters are too ambiguous away from the number.
            lower
                .split(|c: char| !c.is_alphabetic())
                .filter(|word| word.len() > 1)
                .find_map(unit_multiplier)
        })
        .unwrap_or(1.0);

    (value * multiplier).round()
}

fn unit_multiplier(word: &str) -> Option<f64> {
    match word {
        "cr" | "crs" | "crore" | "crores" => Some(CRORE),
        "l" | "lac" | "lacs" | "lakh" | "lakhs" => Some(LAKH),
        _ => None,
    }
}

/// Parse the leading digit group of an area such as `"2,375 sqft"`.
/// Yields 0 when no digits are present.
#[must_use]
pub fn extract_area(text: &str) -> f64 {
    leading_number(text).map_or(0.0, |(value, _)| value)
}

/// Price of a listing in rupees (0 when missing or unparseable)
#[must_use]
pub fn listing_price(listing: &Listing) -> f64 {
    sanitize(match &listing.price {
        Some(FieldValue::Number(n)) => *n,
        Some(FieldValue::Text(t)) => extract_price(t),
        None => 0.0,
    })
}

/// Area of a listing in square feet (0 when missing or unparseable)
#[must_use]
pub fn listing_area(listing: &Listing) -> f64 {
    sanitize(match &listing.area {
        Some(FieldValue::Number(n)) => *n,
        Some(FieldValue::Text(t)) => extract_area(t),
        None => 0.0,
    })
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// First number in `text` (thousands separators allowed) and the text
/// following it
fn leading_number(text: &str) -> Option<(f64, &str)> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .unwrap_or(tail.len());

    let digits: String = tail[..end].chars().filter(|c| *c != ',').collect();
    let digits = digits.trim_end_matches('.');
    let value = digits.parse::<f64>().ok()?;
    Some((value, &tail[end..]))
}
