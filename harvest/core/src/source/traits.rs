//! Listing Source Traits
//!
//! The backend offers two transports: request/response batches addressed by
//! offset and limit, and a server-push event stream keyed by a target
//! identifier. [`ListingSource`] abstracts both so the controller can be
//! driven by HTTP in production and by scripted sources in tests.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::listing::Batch;

/// Search parameters identifying a batch-mode session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Free-text query
    pub query: String,
    /// Optional property type filter (e.g. "apartment")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    /// Optional message type filter (e.g. "rent", "sale")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl SearchQuery {
    /// Create a query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set property type
    #[must_use]
    pub fn with_property_type(mut self, property_type: impl Into<String>) -> Self {
        self.property_type = Some(property_type.into());
        self
    }

    /// Set message type
    #[must_use]
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// One batch request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRequest {
    /// Search parameters
    pub search: SearchQuery,
    /// Count of items already retrieved
    pub offset: usize,
    /// Requested batch size
    pub limit: usize,
}

impl BatchRequest {
    /// Create a batch request
    #[must_use]
    pub fn new(search: SearchQuery, offset: usize, limit: usize) -> Self {
        Self {
            search,
            offset,
            limit,
        }
    }
}

/// Raw named event from the event stream.
///
/// Payloads are left undecoded; the ingestor decides how malformed data is
/// handled per event kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// `property` event: one listing as JSON
    Property(String),
    /// `complete` event: JSON summary
    Complete(String),
    /// `error` event: JSON or plain-text message
    Error(String),
}

/// Receiver of stream frames. An `Err` item is a transport failure; channel
/// closure is a transport-level close.
pub type FrameReceiver = mpsc::Receiver<Result<StreamFrame>>;

/// Listings backend
///
/// Implement this trait to connect the controller to a backend.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Get the source name (for logs)
    fn name(&self) -> &str;

    /// Fetch one batch. Fewer than `limit` items signals end-of-data.
    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch>;

    /// Open the event stream for `target`.
    ///
    /// Frames arrive on the returned channel in delivery order. The channel
    /// closes when the connection closes. Dropping the receiver must stop
    /// the underlying reader.
    async fn open_stream(&self, target: &str) -> Result<FrameReceiver>;
}
