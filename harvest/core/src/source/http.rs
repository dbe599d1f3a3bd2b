//! HTTP Listing Source
//!
//! Listing source for the property-search backend.
//!
//! # Backend API
//!
//! - `GET {batch_path}?offset=&limit=&query=&propertyType=&messageType=`
//!   returns `{ "items": [...], "totalCount": n }`
//! - `GET {stream_path}?url=<target>` returns `text/event-stream` with
//!   `property`, `complete` and `error` events

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::sse::SseDecoder;
use super::traits::{BatchRequest, FrameReceiver, ListingSource, StreamFrame};
use crate::config::BackendSettings;
use crate::error::{HarvestError, Result};
use crate::listing::Batch;

/// Longest error body kept in [`HarvestError::Http`]
const MAX_ERROR_BODY: usize = 512;

/// Listing source backed by the HTTP API
#[derive(Clone)]
pub struct HttpListingSource {
    /// Base URL, no trailing slash
    base_url: String,
    /// Batch endpoint path
    batch_path: String,
    /// Event-stream endpoint path
    stream_path: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpListingSource {
    /// Create a source for `base_url` with default endpoint paths
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::from_config(&BackendSettings {
            base_url: base_url.into(),
            ..BackendSettings::default()
        })
    }

    /// Create from backend settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(settings: &BackendSettings) -> Result<Self> {
        // No overall client timeout: it would also cut off long-lived
        // streams. Batch deadlines are enforced by the request lifecycle.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .build()
            .map_err(|e| HarvestError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            batch_path: settings.batch_path.clone(),
            stream_path: settings.stream_path.clone(),
            http_client,
        })
    }

    /// Get the batch endpoint URL
    fn batch_url(&self) -> String {
        format!("{}{}", self.base_url, self.batch_path)
    }

    /// Get the stream endpoint URL
    fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.stream_path)
    }

    /// Query parameters for a batch request
    fn batch_params(request: &BatchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("offset", request.offset.to_string()),
            ("limit", request.limit.to_string()),
            ("query", request.search.query.clone()),
        ];
        if let Some(ref property_type) = request.search.property_type {
            params.push(("propertyType", property_type.clone()));
        }
        if let Some(ref message_type) = request.search.message_type {
            params.push(("messageType", message_type.clone()));
        }
        params
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(HarvestError::Http { status, body })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch> {
        let response = self
            .http_client
            .get(self.batch_url())
            .query(&Self::batch_params(request))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.text().await?;
        let batch: Batch = serde_json::from_str(&body)?;

        tracing::debug!(
            offset = request.offset,
            limit = request.limit,
            received = batch.items.len(),
            "Fetched batch"
        );
        Ok(batch)
    }

    async fn open_stream(&self, target: &str) -> Result<FrameReceiver> {
        let (tx, rx) = mpsc::channel(256);

        let response = self
            .http_client
            .get(self.stream_url())
            .query(&[("url", target)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();

            loop {
                // Stop as soon as the receiver is gone, even while the server is idle
                let chunk = tokio::select! {
                    () = tx.closed() => {
                        tracing::debug!("Stream receiver dropped, closing connection");
                        return;
                    }
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    break;
                };
                match chunk {
                    Ok(bytes) => {
                        for event in decoder.feed(&bytes) {
                            let frame = match event.event.as_str() {
                                "property" => StreamFrame::Property(event.data),
                                "complete" => StreamFrame::Complete(event.data),
                                "error" => StreamFrame::Error(event.data),
                                other => {
                                    tracing::debug!(event = other, "Ignoring unknown stream event");
                                    continue;
                                }
                            };
                            if tx.send(Ok(frame)).await.is_err() {
                                // Receiver dropped, stop streaming
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(HarvestError::from(e))).await;
                        return;
                    }
                }
            }

            // A final event without its blank-line terminator still counts
            if let Some(event) = decoder.finish() {
                let frame = match event.event.as_str() {
                    "property" => Some(StreamFrame::Property(event.data)),
                    "complete" => Some(StreamFrame::Complete(event.data)),
                    "error" => Some(StreamFrame::Error(event.data)),
                    _ => None,
                };
                if let Some(frame) = frame {
                    let _ = tx.send(Ok(frame)).await;
                }
            }
            // Dropping tx closes the channel: a transport-level close
        });

        Ok(rx)
    }
}
