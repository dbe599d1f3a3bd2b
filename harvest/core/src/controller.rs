//! Acquisition Controller
//!
//! Owns one session at a time and wires the components together:
//!
//! ```text
//!   search() / open_stream()
//!          │
//!          ▼
//!   RequestLifecycle ──begin()──► spawned task (ticket.run) ──┐
//!          ▲                                                  │ completion
//!          │ settle()                                         ▼
//!   poll() / next_update() ◄──── mpsc ────────────────── batch / frames
//!          │
//!          ├─► AccumulationStore ─► WindowedPaginator ─► current_page()
//!          │                     └► compute_bounds ───► BoundsChanged
//!          └─► StreamIngestor (stream sessions)
//! ```
//!
//! Network work runs in spawned tasks; every state mutation happens on the
//! caller's side inside [`Controller::poll`] or [`Controller::next_update`],
//! so reads between two calls never observe a half-applied batch.
//! Methods that start network work must be called within a Tokio runtime.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::filter::{self, compute_bounds, FilterBounds, FilterState, GroupedView};
use crate::lifecycle::{Outcome, RequestId, RequestLifecycle};
use crate::listing::{Batch, Listing};
use crate::paginator::WindowedPaginator;
use crate::source::{BatchRequest, ListingSource, SearchQuery};
use crate::store::AccumulationStore;
use crate::stream::{IngestEvent, StreamIngestor, StreamStatus, StreamSummary};

/// Buffered frames between the forwarding task and the ingestor
const STREAM_BUFFER: usize = 256;

// ============================================================================
// Session types
// ============================================================================

/// What a session fetches
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionKey {
    /// Batch-mode search
    Search(SearchQuery),
    /// Event stream for a target
    Stream(String),
}

/// One search or stream, replaced wholesale when a new one starts
#[derive(Clone, Debug)]
pub struct Session {
    /// Unique session identifier
    pub id: Uuid,
    /// What the session fetches
    pub key: SessionKey,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

impl Session {
    fn new(key: SessionKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            started_at: Utc::now(),
        }
    }
}

/// What the caller should render
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// No session
    Idle,
    /// First data not yet received
    Loading,
    /// Listings available
    Results {
        /// Unique listings accumulated
        count: usize,
    },
    /// The session finished without finding anything
    NoResults,
    /// The session failed; listings received before the failure remain
    Failed(HarvestError),
}

/// Change notifications returned by [`Controller::poll`]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ControllerUpdate {
    /// A remote batch landed
    BatchApplied {
        /// Offset of the batch
        offset: usize,
        /// Listings in the response
        received: usize,
        /// Listings actually added
        appended: usize,
        /// Unique listings accumulated
        total: usize,
    },
    /// Stream listings landed
    ItemsStreamed {
        /// Listings actually added
        appended: usize,
        /// Property events received
        received: usize,
        /// Unique listings accumulated
        total: usize,
    },
    /// The stream sent `complete`
    StreamCompleted(StreamSummary),
    /// The session failed
    Failed(#[serde(serialize_with = "display")] HarvestError),
    /// A superseded request completed and was discarded
    Superseded(#[serde(serialize_with = "display")] RequestId),
    /// Price or area bounds changed
    BoundsChanged(FilterBounds),
}

fn display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

struct BatchCompletion {
    id: RequestId,
    offset: usize,
    limit: usize,
    outcome: Outcome<Batch>,
}

// ============================================================================
// Controller
// ============================================================================

/// Incremental acquisition controller over a [`ListingSource`]
pub struct Controller<S: ListingSource + ?Sized + 'static> {
    source: Arc<S>,
    lifecycle: RequestLifecycle,
    store: AccumulationStore,
    paginator: WindowedPaginator,
    ingestor: StreamIngestor,
    session: Option<Session>,
    filter_state: FilterState,
    default_threshold: f64,
    bounds: FilterBounds,
    last_error: Option<HarvestError>,
    completions_tx: mpsc::UnboundedSender<BatchCompletion>,
    completions_rx: mpsc::UnboundedReceiver<BatchCompletion>,
    disposed: bool,
}

impl<S: ListingSource + ?Sized + 'static> Controller<S> {
    /// Create an idle controller
    #[must_use]
    pub fn new(source: Arc<S>, config: &HarvestConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let default_threshold = config.filters.relevance_threshold;

        Self {
            source,
            lifecycle: RequestLifecycle::with_timeout(config.backend.request_timeout()),
            store: AccumulationStore::new(),
            paginator: WindowedPaginator::new(&config.pagination),
            ingestor: StreamIngestor::new(),
            session: None,
            filter_state: FilterState::new(default_threshold),
            default_threshold,
            bounds: FilterBounds::default(),
            last_error: None,
            completions_tx,
            completions_rx,
            disposed: false,
        }
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Start a batch-mode session, replacing the current one
    pub fn search(&mut self, query: SearchQuery) {
        self.start_session(SessionKey::Search(query));
    }

    /// Start a stream-mode session, replacing the current one
    pub fn open_stream(&mut self, target: impl Into<String>) {
        self.start_session(SessionKey::Stream(target.into()));
    }

    /// Restart the current session from offset 0
    pub fn refresh(&mut self) {
        match self.session.as_ref().map(|s| s.key.clone()) {
            Some(key) => self.start_session(key),
            None => tracing::debug!("Refresh without a session"),
        }
    }

    /// Cancel in-flight work and return to [`SessionState::Idle`]
    pub fn reset(&mut self) {
        self.teardown();
        if let Some(session) = self.session.take() {
            tracing::info!(session_id = %session.id, "Session reset");
        }
    }

    /// Cancel in-flight work and refuse new sessions. Safe to call at any
    /// point and more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.reset();
        self.disposed = true;
    }

    /// Whether [`dispose`](Self::dispose) was called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn start_session(&mut self, key: SessionKey) {
        if self.disposed {
            tracing::warn!("Ignoring new session on a disposed controller");
            return;
        }

        self.teardown();
        let session = Session::new(key.clone());
        let session_id = session.id;
        self.session = Some(session);

        match key {
            SessionKey::Search(query) => {
                tracing::info!(
                    session_id = %session_id,
                    source = self.source.name(),
                    query = %query.query,
                    "Starting search session"
                );
                self.issue_batch(query, 0);
            }
            SessionKey::Stream(target) => {
                tracing::info!(
                    session_id = %session_id,
                    source = self.source.name(),
                    target = %target,
                    "Starting stream session"
                );
                self.issue_stream(target);
            }
        }
    }

    /// Cancel the active request and clear all session data
    fn teardown(&mut self) {
        self.lifecycle.cancel();
        self.ingestor.reset();
        self.store.reset();
        self.paginator.reset();
        self.filter_state = FilterState::new(self.default_threshold);
        self.bounds = FilterBounds::default();
        self.last_error = None;
    }

    fn issue_batch(&mut self, search: SearchQuery, offset: usize) {
        self.store.mark_requested(offset);
        let ticket = self.lifecycle.begin();
        let request = BatchRequest::new(search, offset, self.paginator.remote_batch_size());
        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();

        tracing::debug!(request_id = %ticket.id(), offset, limit = request.limit, "Requesting batch");

        tokio::spawn(async move {
            let outcome = ticket.run(source.fetch_batch(&request)).await;
            // The controller may be gone; nothing to report to then
            let _ = tx.send(BatchCompletion {
                id: ticket.id(),
                offset: request.offset,
                limit: request.limit,
                outcome,
            });
        });
    }

    fn issue_stream(&mut self, target: String) {
        let ticket = self.lifecycle.begin_unbounded();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        self.ingestor.open(target.clone(), rx);
        let source = Arc::clone(&self.source);

        tracing::debug!(request_id = %ticket.id(), target = %target, "Opening stream");

        tokio::spawn(async move {
            let mut upstream = match ticket.run(source.open_stream(&target)).await {
                Outcome::Success(upstream) => upstream,
                Outcome::Failed(error) => {
                    let _ = tx.send(Err(error)).await;
                    return;
                }
                Outcome::Cancelled => return,
            };

            loop {
                tokio::select! {
                    biased;
                    () = ticket.token().cancelled() => break,
                    frame = upstream.recv() => match frame {
                        Some(frame) => {
                            if tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            // Dropping tx tells the ingestor the transport closed
        });
    }

    // ------------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------------

    /// Apply everything that has arrived, without waiting
    pub fn poll(&mut self) -> Vec<ControllerUpdate> {
        let mut updates = Vec::new();

        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply_batch(completion, &mut updates);
        }

        for event in self.ingestor.poll(&mut self.store) {
            self.apply_ingest(event, &mut updates);
        }

        updates
    }

    /// Wait until something arrives and apply it.
    ///
    /// Returns immediately with whatever is ready, or with nothing when the
    /// controller is idle.
    pub async fn next_update(&mut self) -> Vec<ControllerUpdate> {
        let mut updates = self.poll();
        if !updates.is_empty() || !self.is_busy() {
            return updates;
        }

        tokio::select! {
            Some(completion) = self.completions_rx.recv() => {
                self.apply_batch(completion, &mut updates);
            }
            Some(delivery) = self.ingestor.recv() => {
                if let Some(event) = self.ingestor.deliver(delivery, &mut self.store) {
                    self.apply_ingest(event, &mut updates);
                }
            }
        }

        updates
    }

    /// Drive until no request or stream is active, including prefetches
    /// issued along the way
    pub async fn wait_idle(&mut self) -> Vec<ControllerUpdate> {
        let mut updates = self.poll();
        while self.is_busy() {
            updates.extend(self.next_update().await);
        }
        updates
    }

    /// Whether a request or stream is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lifecycle.is_loading() || self.ingestor.is_open()
    }

    /// Whether the loading indicator is set
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lifecycle.is_loading()
    }

    fn apply_batch(&mut self, completion: BatchCompletion, updates: &mut Vec<ControllerUpdate>) {
        let BatchCompletion {
            id,
            offset,
            limit,
            outcome,
        } = completion;

        let Some(result) = self.lifecycle.settle(id, outcome) else {
            updates.push(ControllerUpdate::Superseded(id));
            return;
        };

        match result {
            Ok(batch) => {
                let received = batch.items.len();
                let appended = self.store.append(batch.items);
                self.paginator.record_batch(limit, received);

                tracing::info!(
                    session_id = %self.session_id_display(),
                    request_id = %id,
                    offset,
                    received,
                    appended,
                    total = self.store.len(),
                    "Batch applied"
                );
                updates.push(ControllerUpdate::BatchApplied {
                    offset,
                    received,
                    appended,
                    total: self.store.len(),
                });

                self.update_bounds(updates);
                self.maybe_prefetch();
            }
            Err(error) => self.fail(error, updates),
        }
    }

    fn apply_ingest(&mut self, event: IngestEvent, updates: &mut Vec<ControllerUpdate>) {
        match event {
            IngestEvent::Items { appended, received } => {
                updates.push(ControllerUpdate::ItemsStreamed {
                    appended,
                    received,
                    total: self.store.len(),
                });
                if appended > 0 {
                    self.update_bounds(updates);
                }
            }
            IngestEvent::Completed(summary) => {
                self.lifecycle.finish();
                updates.push(ControllerUpdate::StreamCompleted(summary));
            }
            IngestEvent::Failed(error) => {
                self.lifecycle.finish();
                self.fail(error, updates);
            }
        }
    }

    fn fail(&mut self, error: HarvestError, updates: &mut Vec<ControllerUpdate>) {
        tracing::warn!(
            session_id = %self.session_id_display(),
            error = %error,
            "Session failed"
        );
        self.paginator.halt();
        self.last_error = Some(error.clone());
        updates.push(ControllerUpdate::Failed(error));
    }

    fn update_bounds(&mut self, updates: &mut Vec<ControllerUpdate>) {
        let next = compute_bounds(self.store.items());
        if next == self.bounds {
            return;
        }
        self.filter_state.reconcile(&self.bounds, &next);
        self.bounds = next;
        updates.push(ControllerUpdate::BoundsChanged(next));
    }

    fn maybe_prefetch(&mut self) {
        if self.lifecycle.is_loading() || self.last_error.is_some() {
            return;
        }
        let Some(SessionKey::Search(query)) = self.session.as_ref().map(|s| &s.key) else {
            return;
        };
        let Some(offset) = self
            .paginator
            .prefetch_offset(&self.store)
            .or_else(|| self.paginator.catch_up_offset(&self.store))
        else {
            return;
        };

        tracing::info!(
            page = self.paginator.local_page(),
            offset,
            "Prefetching next batch"
        );
        let query = query.clone();
        self.issue_batch(query, offset);
    }

    fn session_id_display(&self) -> String {
        self.session
            .as_ref()
            .map_or_else(|| "none".to_string(), |s| s.id.to_string())
    }

    // ------------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------------

    /// Listings on the current local page
    #[must_use]
    pub fn current_page(&self) -> &[Listing] {
        self.paginator.current_page_items(&self.store)
    }

    /// Current local page (1-based)
    #[must_use]
    pub fn page(&self) -> usize {
        self.paginator.local_page()
    }

    /// Advance one page; may prefetch the next batch
    pub fn next(&mut self) -> usize {
        let page = self.paginator.next();
        self.maybe_prefetch();
        page
    }

    /// Go back one page (floored at 1)
    pub fn previous(&mut self) -> usize {
        let page = self.paginator.previous();
        self.maybe_prefetch();
        page
    }

    /// Jump to `page` (floored at 1); may prefetch the next batch
    pub fn go_to_page(&mut self, page: usize) -> usize {
        let page = self.paginator.go_to(page);
        self.maybe_prefetch();
        page
    }

    /// Whether the backend is believed to have more data
    #[must_use]
    pub fn more_available(&self) -> bool {
        self.paginator.more_available()
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// Filter and group everything accumulated so far
    #[must_use]
    pub fn filtered_grouped_view(&self, state: &FilterState) -> GroupedView {
        filter::apply(self.store.items(), state, Local::now().date_naive())
    }

    /// Filter state kept in step with the bounds
    #[must_use]
    pub fn filter_state(&self) -> &FilterState {
        &self.filter_state
    }

    /// Mutable filter state
    pub fn filter_state_mut(&mut self) -> &mut FilterState {
        &mut self.filter_state
    }

    /// Current price and area bounds
    #[must_use]
    pub fn bounds(&self) -> FilterBounds {
        self.bounds
    }

    /// Every listing accumulated this session
    #[must_use]
    pub fn items(&self) -> &[Listing] {
        self.store.items()
    }

    /// Current session
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Status of the stream in a stream session
    #[must_use]
    pub fn stream_status(&self) -> &StreamStatus {
        self.ingestor.status()
    }

    /// What the caller should render
    #[must_use]
    pub fn state(&self) -> SessionState {
        if let Some(ref error) = self.last_error {
            return SessionState::Failed(error.clone());
        }
        if self.session.is_none() {
            return SessionState::Idle;
        }
        if !self.store.is_empty() {
            return SessionState::Results {
                count: self.store.len(),
            };
        }
        if self.is_busy() {
            SessionState::Loading
        } else {
            SessionState::NoResults
        }
    }
}

impl<S: ListingSource + ?Sized + 'static> Drop for Controller<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
