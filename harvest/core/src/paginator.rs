//! Windowed Paginator
//!
//! Fixed-size local pages over the accumulated set, and the rule that
//! decides when the next remote batch is prefetched.
//!
//! Local pages are counted from 1 and grouped into remote batches of
//! `pages_per_batch = ceil(remote_batch_size / page_size)` pages. Each
//! page windows into its own batch's offset range, so when the batch size
//! is not a multiple of the page size the last page of every batch is
//! short rather than straddling two batches.
//!
//! ```text
//!  page_size = 200, remote_batch_size = 900, trigger = 4
//!
//!  batch 0 (offset 0)      batch 1 (offset 900)     batch 2 (offset 1800)
//!  ┌──┬──┬──┬──┬─┐        ┌──┬──┬──┬──┬─┐          ┌──┬──┬──┬──┬─┐
//!  │1 │2 │3 │4*│5│        │6 │7 │8 │9*│10│         │11│12│13│14*│15│
//!  └──┴──┴──┴──┴─┘        └──┴──┴──┴──┴─┘          └──┴──┴──┴──┴─┘
//!            └─ prefetch offset 900   └─ prefetch offset 1800
//! ```
//!
//! Jumping straight past a trigger page into a batch nobody requested
//! catches up instead: the next contiguous batch is fetched, one at a time,
//! until the page's own batch arrives.
//!
//! Forward navigation is always permitted, even past the last known page.
//! Reaching a page is what discovers further data, so an empty page is an
//! expected result once the backend runs out.

use std::ops::Range;

use crate::config::PaginationSettings;
use crate::listing::Listing;
use crate::store::AccumulationStore;

/// Local-page state machine over the accumulated set
#[derive(Clone, Debug)]
pub struct WindowedPaginator {
    page_size: usize,
    remote_batch_size: usize,
    trigger_page_within_batch: usize,
    /// Current page, 1-based
    local_page: usize,
    /// Cleared once a batch returns fewer items than requested
    more_available: bool,
}

impl WindowedPaginator {
    /// Create a paginator from validated settings
    #[must_use]
    pub fn new(settings: &PaginationSettings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            remote_batch_size: settings.remote_batch_size.max(1),
            trigger_page_within_batch: settings.trigger_page_within_batch,
            local_page: 1,
            more_available: true,
        }
    }

    /// Items per local page
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Items requested per remote batch
    #[must_use]
    pub fn remote_batch_size(&self) -> usize {
        self.remote_batch_size
    }

    /// Local pages in one remote batch
    #[must_use]
    pub fn pages_per_batch(&self) -> usize {
        self.remote_batch_size.div_ceil(self.page_size)
    }

    /// Current local page (1-based)
    #[must_use]
    pub fn local_page(&self) -> usize {
        self.local_page
    }

    /// Whether more remote data is believed available
    #[must_use]
    pub fn more_available(&self) -> bool {
        self.more_available
    }

    /// Record the size of a landed batch; a short batch ends the data
    pub fn record_batch(&mut self, requested: usize, received: usize) {
        if received < requested && self.more_available {
            tracing::info!(requested, received, "Backend reached end of data");
            self.more_available = false;
        }
    }

    /// Stop prefetching for the rest of the session
    pub fn halt(&mut self) {
        self.more_available = false;
    }

    /// Return to page 1 with data believed available (new session)
    pub fn reset(&mut self) {
        self.local_page = 1;
        self.more_available = true;
    }

    /// Advance one page. Always permitted.
    pub fn next(&mut self) -> usize {
        self.local_page += 1;
        self.local_page
    }

    /// Go back one page, floored at 1
    pub fn previous(&mut self) -> usize {
        self.local_page = self.local_page.saturating_sub(1).max(1);
        self.local_page
    }

    /// Jump to `page`, floored at 1
    pub fn go_to(&mut self, page: usize) -> usize {
        self.local_page = page.max(1);
        self.local_page
    }

    /// Remote batch index (0-based) that `page` belongs to
    #[must_use]
    pub fn batch_index(&self, page: usize) -> usize {
        (page.max(1) - 1) / self.pages_per_batch()
    }

    /// Position of `page` within its batch (1-based)
    #[must_use]
    pub fn page_within_batch(&self, page: usize) -> usize {
        (page.max(1) - 1) % self.pages_per_batch() + 1
    }

    /// Offset range of the accumulated set shown on `page`
    #[must_use]
    pub fn window(&self, page: usize) -> Range<usize> {
        let batch_start = self.batch_index(page) * self.remote_batch_size;
        let batch_end = batch_start + self.remote_batch_size;
        let start = batch_start + (self.page_within_batch(page) - 1) * self.page_size;
        let end = (start + self.page_size).min(batch_end);
        start..end
    }

    /// Listings on the current page
    #[must_use]
    pub fn current_page_items<'a>(&self, store: &'a AccumulationStore) -> &'a [Listing] {
        store.window(self.window(self.local_page))
    }

    /// Offset to prefetch for the current page, if the prefetch rule fires.
    ///
    /// Fires on the trigger page of a batch while more data is believed
    /// available, the next batch has not been requested, and everything
    /// before that batch has already been received.
    #[must_use]
    pub fn prefetch_offset(&self, store: &AccumulationStore) -> Option<usize> {
        if !self.more_available {
            return None;
        }
        if self.page_within_batch(self.local_page) != self.trigger_page_within_batch {
            return None;
        }

        let offset = (self.batch_index(self.local_page) + 1) * self.remote_batch_size;
        if store.is_requested(offset) || store.received() < offset {
            return None;
        }
        Some(offset)
    }

    /// Offset to fetch when the current page lies in a batch beyond
    /// everything requested so far (the user jumped past the trigger page).
    ///
    /// Always the next contiguous offset, so repeated evaluation walks
    /// forward one batch at a time until the page's batch arrives.
    #[must_use]
    pub fn catch_up_offset(&self, store: &AccumulationStore) -> Option<usize> {
        if !self.more_available {
            return None;
        }
        let received = store.received();
        let page_batch_start = self.batch_index(self.local_page) * self.remote_batch_size;
        if page_batch_start < received || received % self.remote_batch_size != 0 {
            return None;
        }
        (!store.is_requested(received)).then_some(received)
    }
}
