//! Harvest Core - Incremental Property Acquisition
//!
//! This crate pulls large, unbounded property-listing result sets from a
//! remote backend, accumulates them safely under request cancellation,
//! windows them into stable local pages and derives filtered, grouped views
//! over everything received so far. It is completely independent of any UI
//! framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Caller (UI / CLI)                        │
//! │   search / open_stream / next / go_to_page / filtered view       │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │  ControllerUpdate (poll)
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                          Controller                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │  Request     │  │ Accumulation │  │  Windowed Paginator    │  │
//! │  │  Lifecycle   │  │    Store     │  │  Stream Ingestor       │  │
//! │  └──────┬───────┘  └──────────────┘  │  Filter/Group Engine   │  │
//! │         │                            └────────────────────────┘  │
//! └─────────┼────────────────────────────────────────────────────────┘
//!           │
//! ┌─────────┴────────────────────────────────────────────────────────┐
//! │              ListingSource (HTTP batches + SSE stream)           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use harvest_core::{Controller, HarvestConfig, HttpListingSource, SearchQuery};
//!
//! let config = HarvestConfig::default();
//! let source = Arc::new(HttpListingSource::from_config(&config.backend)?);
//! let mut controller = Controller::new(source, &config);
//!
//! controller.search(SearchQuery::new("3 bhk baner"));
//! controller.wait_idle().await;
//! for listing in controller.current_page() {
//!     println!("{}", listing.title);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`source`]: Backend access (batch fetch and event stream)
//! - [`lifecycle`]: One active request, cancellation and late-result gating
//! - [`store`]: Deduplicated, first-seen ordered accumulation
//! - [`paginator`]: Local pages over remote batches, prefetch rule
//! - [`stream`]: Event-stream ingestion
//! - [`filter`]: Price/area extraction, bounds, filtering and grouping
//! - [`controller`]: Session owner tying everything together
//! - [`config`]: Layered TOML / environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod listing;
pub mod paginator;
pub mod source;
pub mod store;
pub mod stream;

pub use config::{
    default_config_path, load_config, load_config_from_path, BackendSettings, ConfigError,
    ConfigOverrides, ConfigSource, FilterSettings, HarvestConfig, HarvestToml,
    PaginationSettings,
};
pub use controller::{Controller, ControllerUpdate, Session, SessionKey, SessionState};
pub use error::{HarvestError, Result};
pub use filter::{
    apply, classify_posted_date, compute_bounds, extract_area, extract_price, listing_area,
    listing_price, Bounds, DateBucket, FilterBounds, FilterState, GroupedView, ListingGroup, CRORE,
    LAKH,
};
pub use lifecycle::{Outcome, RequestId, RequestLifecycle, RequestTicket};
pub use listing::{Batch, FieldValue, Listing};
pub use paginator::WindowedPaginator;
pub use source::{BatchRequest, HttpListingSource, ListingSource, SearchQuery, StreamFrame};
pub use store::AccumulationStore;
pub use stream::{IngestEvent, StreamIngestor, StreamStatus, StreamSummary};
