//! Listing Data Model
//!
//! Property listings as the backend delivers them. Attributes vary by
//! upstream source, so everything beyond the stable key and title is
//! optional and unknown fields are preserved in [`Listing::extra`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A value the backend sends either as a number or as display text
/// (`"₹5.34 Cr"`, `"2,375 sqft"`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Plain numeric value
    Number(f64),
    /// Free-form text
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// A single property listing
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Listing URL (preferred key)
    #[serde(default)]
    pub url: Option<String>,
    /// Backend identifier (fallback key)
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Listing title
    #[serde(default)]
    pub title: String,
    /// Asking price
    #[serde(default)]
    pub price: Option<FieldValue>,
    /// Built-up / carpet area
    #[serde(default)]
    pub area: Option<FieldValue>,
    /// Relevance score on a 0-10 scale
    #[serde(default, deserialize_with = "lenient_score")]
    pub relevance_score: Option<f64>,
    /// Free-text reason for the score
    #[serde(default)]
    pub relevance_explanation: Option<String>,
    /// Criteria the listing satisfies
    #[serde(default)]
    pub matches: Vec<String>,
    /// Criteria the listing misses
    #[serde(default)]
    pub mismatches: Vec<String>,
    /// Natural-language posting date ("2 days ago", "Yesterday", ...)
    #[serde(default)]
    pub posted_date: Option<String>,
    /// Listing description
    #[serde(default)]
    pub description: Option<String>,
    /// Source-specific attributes, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Listing {
    /// Create a listing keyed by URL
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the price
    #[must_use]
    pub fn with_price(mut self, price: impl Into<FieldValue>) -> Self {
        self.price = Some(price.into());
        self
    }

    /// Set the area
    #[must_use]
    pub fn with_area(mut self, area: impl Into<FieldValue>) -> Self {
        self.area = Some(area.into());
        self
    }

    /// Set the relevance score
    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// Set the posted date text
    #[must_use]
    pub fn with_posted_date(mut self, posted: impl Into<String>) -> Self {
        self.posted_date = Some(posted.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stable identity used for deduplication.
    ///
    /// URL first, then id. Listings carrying neither fall back to the title.
    #[must_use]
    pub fn key(&self) -> &str {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.id.as_deref().filter(|i| !i.is_empty()))
            .unwrap_or(&self.title)
    }
}

/// One response from the batch endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Listings in this batch
    #[serde(default, alias = "properties")]
    pub items: Vec<Listing>,
    /// Total/partial count hint from the backend
    #[serde(default)]
    pub total_count: Option<usize>,
    /// Upstream source identifier
    #[serde(default)]
    pub source: Option<String>,
    /// Number of upstream calls consumed producing this batch
    #[serde(default)]
    pub upstream_calls: Option<u32>,
}

impl Batch {
    /// Create a batch from listings
    #[must_use]
    pub fn new(items: Vec<Listing>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
