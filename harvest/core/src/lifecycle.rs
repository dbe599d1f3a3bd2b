//! Request Lifecycle
//!
//! Tracks the single in-flight request of a controller. Starting a new
//! request cancels the previous one, and late completions of superseded
//! requests are gated out before they can touch accumulated state.
//!
//! # Flow
//!
//! ```text
//!   begin() ──► RequestTicket ──► spawned task: ticket.run(fetch) ──► Outcome
//!      │                                                                 │
//!      └─ cancels previous token                 settle(id, outcome) ◄───┘
//!                                                  │
//!                             stale id / Cancelled └─► None (ignored)
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{HarvestError, Result};

/// Identifier of one issued request, unique per lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Tagged result of one supervised request
#[derive(Debug, PartialEq)]
pub enum Outcome<T> {
    /// Completed while still current
    Success(T),
    /// Superseded or torn down; never surfaced to the caller
    Cancelled,
    /// Failed with a user-visible error
    Failed(HarvestError),
}

/// Handle given to the task performing a request
#[derive(Clone, Debug)]
pub struct RequestTicket {
    id: RequestId,
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl RequestTicket {
    /// Request identifier
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Cancellation token for cooperative shutdown of the operation
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this request has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive one network operation under this ticket.
    ///
    /// A request whose token is cancelled before it completes resolves as
    /// [`Outcome::Cancelled`], even if the operation itself succeeded.
    pub async fn run<T, F>(&self, request: F) -> Outcome<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guarded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| {
                        Err(HarvestError::Timeout(
                            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        ))
                    }),
                None => request.await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Outcome::Cancelled,
            result = guarded => {
                if self.token.is_cancelled() {
                    return Outcome::Cancelled;
                }
                match result {
                    Ok(value) => Outcome::Success(value),
                    Err(HarvestError::Cancelled) => Outcome::Cancelled,
                    Err(e) => Outcome::Failed(e),
                }
            }
        }
    }
}

struct ActiveRequest {
    id: RequestId,
    token: CancellationToken,
}

/// Owner of the controller's one active request
pub struct RequestLifecycle {
    active: Option<ActiveRequest>,
    next_id: u64,
    loading: bool,
    timeout: Option<Duration>,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLifecycle {
    /// Create a lifecycle with no request timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Create a lifecycle whose requests fail after `timeout`
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            active: None,
            next_id: 1,
            loading: false,
            timeout,
        }
    }

    /// Start a new request, cancelling whatever was active
    pub fn begin(&mut self) -> RequestTicket {
        if let Some(previous) = self.active.take() {
            tracing::debug!(request_id = %previous.id, "Superseding active request");
            previous.token.cancel();
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;
        let token = CancellationToken::new();

        self.active = Some(ActiveRequest {
            id,
            token: token.clone(),
        });
        self.loading = true;

        RequestTicket {
            id,
            token,
            timeout: self.timeout,
        }
    }

    /// Like [`begin`](Self::begin) but without a deadline, for long-lived streams
    pub fn begin_unbounded(&mut self) -> RequestTicket {
        let mut ticket = self.begin();
        ticket.timeout = None;
        ticket
    }

    /// Check if `id` is the active, uncancelled request
    #[must_use]
    pub fn is_current(&self, id: RequestId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.id == id && !a.token.is_cancelled())
    }

    /// Identifier of the active request
    #[must_use]
    pub fn active_id(&self) -> Option<RequestId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Whether the loading indicator is set
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Gate an outcome before it is applied.
    ///
    /// Returns `None` for stale or cancelled outcomes; the caller must not
    /// mutate state in that case. Settling the current request ends it and
    /// clears the loading indicator.
    pub fn settle<T>(&mut self, id: RequestId, outcome: Outcome<T>) -> Option<Result<T>> {
        if !self.is_current(id) {
            tracing::debug!(request_id = %id, "Ignoring completion of superseded request");
            return None;
        }

        match outcome {
            Outcome::Success(value) => {
                self.finish();
                Some(Ok(value))
            }
            Outcome::Failed(error) => {
                self.finish();
                Some(Err(error))
            }
            Outcome::Cancelled => {
                self.finish();
                None
            }
        }
    }

    /// End the active request after it reached a terminal result and
    /// release its token, so helper tasks bound to it stop
    pub fn finish(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
        }
        self.clear_loading();
    }

    /// Cancel the active request, if any.
    ///
    /// Returns `true` if something was cancelled.
    pub fn cancel(&mut self) -> bool {
        let cancelled = match self.active.take() {
            Some(active) => {
                tracing::debug!(request_id = %active.id, "Cancelling active request");
                active.token.cancel();
                true
            }
            None => false,
        };
        self.clear_loading();
        cancelled
    }

    /// Clear the loading indicator. Returns `true` only on the call that
    /// actually cleared it.
    fn clear_loading(&mut self) -> bool {
        std::mem::replace(&mut self.loading, false)
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
        }
    }
}
