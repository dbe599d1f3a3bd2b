//! Stream Ingestor
//!
//! Event-stream counterpart of the paginator. Listings arrive one
//! `property` event at a time and are appended to the store in delivery
//! order; `complete` and `error` events, or a transport close, end the
//! stream.
//!
//! # Terminal rules
//!
//! - `complete` is terminal success; anything after it is ignored,
//!   including the transport close that normally follows.
//! - A transport close before `complete` is
//!   [`HarvestError::StreamClosedUnexpectedly`], unless the caller closed
//!   the stream itself (the receiver is dropped, so no close is observed).
//! - A malformed `property` payload is logged and skipped. A malformed
//!   `complete` payload fails the stream.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{HarvestError, Result};
use crate::listing::Listing;
use crate::source::StreamFrame;
use crate::store::AccumulationStore;

/// Payload of the `complete` event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Number of listings the backend reports having sent
    pub count: usize,
    /// Any other fields of the summary
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Lifecycle of the current stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamStatus {
    /// No stream opened this session
    Idle,
    /// Receiving events
    Streaming,
    /// `complete` received
    Completed(StreamSummary),
    /// Ended with an error
    Failed(HarvestError),
    /// Closed by the caller
    Closed,
}

/// Notification produced while ingesting
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    /// Property events were applied
    Items {
        /// Listings actually added (duplicates excluded)
        appended: usize,
        /// Property events received
        received: usize,
    },
    /// Stream completed successfully
    Completed(StreamSummary),
    /// Stream ended with an error
    Failed(HarvestError),
}

impl IngestEvent {
    /// Whether the event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Items { .. })
    }
}

/// One item read from the frame channel
#[derive(Debug)]
pub enum Delivery {
    /// A frame or a transport error
    Frame(Result<StreamFrame>),
    /// The channel closed
    Disconnected,
}

/// Statistics for the current stream
#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    /// Property events received
    pub items_received: u32,
    /// Listings appended to the store
    pub items_appended: u32,
    /// Property events skipped as malformed
    pub items_skipped: u32,
    /// When the stream was opened
    pub started_at: Option<Instant>,
}

struct ActiveStream {
    key: String,
    receiver: mpsc::Receiver<Result<StreamFrame>>,
}

/// Applies stream frames to the accumulation store
pub struct StreamIngestor {
    active: Option<ActiveStream>,
    status: StreamStatus,
    stats: StreamStats,
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIngestor {
    /// Create an idle ingestor
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: None,
            status: StreamStatus::Idle,
            stats: StreamStats::default(),
        }
    }

    /// Start ingesting `receiver` for `key`, closing any previous stream
    pub fn open(&mut self, key: impl Into<String>, receiver: mpsc::Receiver<Result<StreamFrame>>) {
        self.close();
        let key = key.into();
        tracing::debug!(stream_key = %key, "Opening stream");
        self.active = Some(ActiveStream { key, receiver });
        self.status = StreamStatus::Streaming;
        self.stats = StreamStats {
            started_at: Some(Instant::now()),
            ..Default::default()
        };
    }

    /// Close the current stream on the caller's behalf
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(stream_key = %active.key, "Closing stream");
            if self.status == StreamStatus::Streaming {
                self.status = StreamStatus::Closed;
            }
        }
    }

    /// Forget the previous stream entirely (new session)
    pub fn reset(&mut self) {
        self.close();
        self.status = StreamStatus::Idle;
        self.stats = StreamStats::default();
    }

    /// Whether a stream is open and not yet terminal
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Key of the open stream
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.key.as_str())
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    /// Statistics of the current stream
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Wait for the next frame. Returns `None` when no stream is open.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let active = self.active.as_mut()?;
        Some(match active.receiver.recv().await {
            Some(frame) => Delivery::Frame(frame),
            None => Delivery::Disconnected,
        })
    }

    /// Drain every frame available right now (non-blocking).
    ///
    /// Consecutive property events are merged into one
    /// [`IngestEvent::Items`]; a terminal event is always last.
    pub fn poll(&mut self, store: &mut AccumulationStore) -> Vec<IngestEvent> {
        let mut events: Vec<IngestEvent> = Vec::new();

        loop {
            let delivery = match self.active.as_mut() {
                Some(active) => match active.receiver.try_recv() {
                    Ok(frame) => Delivery::Frame(frame),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => Delivery::Disconnected,
                },
                None => break,
            };

            let Some(event) = self.deliver(delivery, store) else {
                continue;
            };
            let terminal = event.is_terminal();
            let merged = match (&event, events.last_mut()) {
                (
                    IngestEvent::Items {
                        appended: more_appended,
                        received: more_received,
                    },
                    Some(IngestEvent::Items { appended, received }),
                ) => {
                    *appended += more_appended;
                    *received += more_received;
                    true
                }
                _ => false,
            };
            if !merged {
                events.push(event);
            }
            if terminal {
                break;
            }
        }

        events
    }

    /// Apply one delivery. Returns `None` when nothing observable happened
    /// (stream already terminal, or a skipped malformed item).
    pub fn deliver(
        &mut self,
        delivery: Delivery,
        store: &mut AccumulationStore,
    ) -> Option<IngestEvent> {
        if self.active.is_none() {
            return None;
        }

        match delivery {
            Delivery::Frame(Ok(StreamFrame::Property(data))) => {
                self.stats.items_received += 1;
                match serde_json::from_str::<Listing>(&data) {
                    Ok(listing) => {
                        let appended = store.push(listing);
                        if appended {
                            self.stats.items_appended += 1;
                        }
                        Some(IngestEvent::Items {
                            appended: usize::from(appended),
                            received: 1,
                        })
                    }
                    Err(e) => {
                        self.stats.items_skipped += 1;
                        tracing::warn!(error = %e, "Skipping malformed property event");
                        None
                    }
                }
            }
            Delivery::Frame(Ok(StreamFrame::Complete(data))) => {
                match serde_json::from_str::<StreamSummary>(&data) {
                    Ok(summary) => {
                        tracing::info!(
                            count = summary.count,
                            appended = self.stats.items_appended,
                            "Stream completed"
                        );
                        self.terminate(StreamStatus::Completed(summary.clone()));
                        Some(IngestEvent::Completed(summary))
                    }
                    Err(e) => {
                        let error = HarvestError::Parse(format!("complete event: {e}"));
                        Some(self.fail(error))
                    }
                }
            }
            Delivery::Frame(Ok(StreamFrame::Error(data))) => {
                Some(self.fail(HarvestError::Remote(error_message(&data))))
            }
            Delivery::Frame(Err(error)) => Some(self.fail(error)),
            Delivery::Disconnected => Some(self.fail(HarvestError::StreamClosedUnexpectedly)),
        }
    }

    fn fail(&mut self, error: HarvestError) -> IngestEvent {
        tracing::warn!(error = %error, "Stream failed");
        self.terminate(StreamStatus::Failed(error.clone()));
        IngestEvent::Failed(error)
    }

    fn terminate(&mut self, status: StreamStatus) {
        // Dropping the receiver makes any later close unobservable
        self.active = None;
        self.status = status;
    }
}

/// Extract a message from an `error` event payload: JSON `{"message"}` or
/// `{"error"}`, a JSON string, or plain text.
fn error_message(data: &str) -> String {
    let text = match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => ["message", "error", "detail"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| data.trim().to_string()),
        Ok(Value::String(s)) => s,
        _ => data.trim().to_string(),
    };
    if text.is_empty() {
        "Unknown stream error".to_string()
    } else {
        text
    }
}
