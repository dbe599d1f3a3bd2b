//! Remote Listing Sources
//!
//! Abstracted access to the listings backend through a common trait.
//!
//! # Available Sources
//!
//! - **HTTP**: batch endpoint plus server-sent event stream (default)
//!
//! # Usage
//!
//! ```ignore
//! use harvest_core::source::{BatchRequest, HttpListingSource, ListingSource, SearchQuery};
//!
//! let source = HttpListingSource::new("http://localhost:8000")?;
//! let request = BatchRequest::new(SearchQuery::new("2 bhk kothrud"), 0, 900);
//! let batch = source.fetch_batch(&request).await?;
//! ```

mod http;
pub mod sse;
mod traits;

pub use http::HttpListingSource;
pub use traits::{BatchRequest, FrameReceiver, ListingSource, SearchQuery, StreamFrame};
