//! Error Types
//!
//! Errors produced while acquiring listings. `Cancelled` is an internal
//! signal: it is absorbed by the request lifecycle and the stream ingestor
//! and never reaches a caller through [`crate::SessionState`].

use thiserror::Error;

/// Errors from the listings backend and the acquisition pipeline
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HarvestError {
    /// Network-level failure (connect, reset, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Parse(String),

    /// Event stream ended before a `complete` event
    #[error("Stream closed unexpectedly")]
    StreamClosedUnexpectedly,

    /// Backend sent an explicit `error` event
    #[error("Backend error: {0}")]
    Remote(String),

    /// Request exceeded the configured deadline
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Superseded by a newer request (internal only)
    #[error("Request cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Whether this error should be shown to the user.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Result alias for acquisition operations
pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
