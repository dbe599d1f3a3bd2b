//! Accumulation Store
//!
//! The ordered, deduplicated set of listings received for the current
//! session, plus bookkeeping of which batch offsets have been requested.
//!
//! Keys are tracked in a `HashSet` so existence checks stay O(1) on
//! average for sets of several thousand listings.

use std::collections::HashSet;
use std::ops::Range;

use crate::listing::Listing;

/// Ordered, key-unique collection of listings for one session
#[derive(Debug, Default)]
pub struct AccumulationStore {
    /// Listings in first-seen order
    items: Vec<Listing>,
    /// Keys present in `items`
    keys: HashSet<String>,
    /// Batch offsets already requested this session
    requested: HashSet<usize>,
    /// Raw count of listings received, duplicates included
    received: usize,
}

impl AccumulationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append listings, dropping any whose key is already present.
    ///
    /// Arrival order is preserved for the survivors. Returns how many
    /// listings were actually added.
    pub fn append(&mut self, listings: impl IntoIterator<Item = Listing>) -> usize {
        let before = self.items.len();
        for listing in listings {
            self.received += 1;
            if self.keys.insert(listing.key().to_string()) {
                self.items.push(listing);
            }
        }
        self.items.len() - before
    }

    /// Append one listing. Returns `true` if it was new.
    pub fn push(&mut self, listing: Listing) -> bool {
        self.append(std::iter::once(listing)) == 1
    }

    /// Clear listings, keys, requested offsets and the received count together
    pub fn reset(&mut self) {
        self.items.clear();
        self.keys.clear();
        self.requested.clear();
        self.received = 0;
    }

    /// Check whether a key is present
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Record that a batch offset has been requested.
    ///
    /// Returns `false` if it was already requested.
    pub fn mark_requested(&mut self, offset: usize) -> bool {
        self.requested.insert(offset)
    }

    /// Check whether a batch offset has been requested
    #[must_use]
    pub fn is_requested(&self, offset: usize) -> bool {
        self.requested.contains(&offset)
    }

    /// Raw number of listings received, including dropped duplicates
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Number of unique listings
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All listings in first-seen order
    #[must_use]
    pub fn items(&self) -> &[Listing] {
        &self.items
    }

    /// Listings within `range`, clamped to what has been accumulated
    #[must_use]
    pub fn window(&self, range: Range<usize>) -> &[Listing] {
        let end = range.end.min(self.items.len());
        let start = range.start.min(end);
        &self.items[start..end]
    }
}
