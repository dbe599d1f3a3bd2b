//! Harvest CLI - Drive a listing-acquisition session from the terminal
//!
//! Runs one search or stream session against a listings backend, walks the
//! requested pages and prints the filtered, grouped view.
//!
//! # Usage
//!
//! ```bash
//! # Search, printing the first three pages
//! harvest search "3 bhk baner" --pages 3
//!
//! # Only apartments for rent, grouped by posting date
//! harvest --by-date search "kothrud" --property-type apartment --message-type rent
//!
//! # Follow a live scrape stream
//! harvest stream "https://portal.example/pune/rent"
//!
//! # Different backend, verbose logging
//! RUST_LOG=debug harvest --base-url http://10.0.0.5:8000 search "wakad"
//! ```

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use harvest_core::{
    load_config_from_path, ConfigOverrides, Controller, ControllerUpdate, HarvestConfig,
    HttpListingSource, SearchQuery, SessionState,
};

/// Harvest - incremental property-listing acquisition
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "HARVEST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Minimum relevance score for the primary group
    #[arg(long, value_name = "SCORE")]
    min_relevance: Option<f64>,

    /// Only show listings whose title or description contains this text
    #[arg(long, value_name = "TEXT")]
    text: Option<String>,

    /// Group listings by posting date
    #[arg(long)]
    by_date: bool,

    /// Print the grouped view as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "HARVEST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a batch-mode search
    Search {
        /// Free-text query
        query: String,

        /// Property type filter
        #[arg(long)]
        property_type: Option<String>,

        /// Message type filter (rent, sale, ...)
        #[arg(long)]
        message_type: Option<String>,

        /// Number of local pages to walk
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Follow an event stream for a target
    Stream {
        /// Target identifier (usually a portal URL)
        target: String,
    },
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("harvest={level},harvest_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file (explicit path, else the default location) and
/// apply command-line overrides
fn resolve_config(args: &Args) -> Result<HarvestConfig> {
    let path = args.config.clone().or_else(harvest_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.base_url {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(threshold) = args.min_relevance {
        overrides = overrides.with_relevance_threshold(threshold);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line override")?;

    info!(
        source = %config.source(),
        base_url = %config.backend.base_url,
        "Configuration resolved"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    let source = Arc::new(
        HttpListingSource::from_config(&config.backend).context("Failed to create HTTP client")?,
    );
    let mut controller = Controller::new(source, &config);

    match args.command {
        Command::Search {
            ref query,
            ref property_type,
            ref message_type,
            pages,
        } => {
            let mut search = SearchQuery::new(query.clone());
            if let Some(t) = property_type {
                search = search.with_property_type(t.clone());
            }
            if let Some(t) = message_type {
                search = search.with_message_type(t.clone());
            }
            run_search(&mut controller, search, pages.max(1)).await;
        }
        Command::Stream { ref target } => {
            run_stream(&mut controller, target).await;
        }
    }

    let filters = {
        let mut state = controller.filter_state().clone();
        if let Some(ref text) = args.text {
            state = state.with_text(text.clone());
        }
        state.with_group_by_date(args.by_date)
    };
    let view = controller.filtered_grouped_view(&filters);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render::bounds(&controller.bounds()));
        print!("{}", render::grouped_view(&view, filters.relevance_threshold));
    }

    let state = controller.state();
    controller.dispose();
    match state {
        SessionState::Failed(error) => anyhow::bail!("Session failed: {error}"),
        SessionState::NoResults => {
            println!("No listings found.");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Walk `pages` local pages, printing each as it fills
async fn run_search(
    controller: &mut Controller<HttpListingSource>,
    query: SearchQuery,
    pages: usize,
) {
    controller.search(query);
    controller.wait_idle().await;

    for page in 1..=pages {
        controller.go_to_page(page);
        controller.wait_idle().await;
        if matches!(controller.state(), SessionState::Failed(_)) {
            break;
        }

        let items = controller.current_page();
        if items.is_empty() {
            info!(page, "Reached an empty page");
            break;
        }
        print!("{}", render::page(page, items));
    }
}

/// Follow the stream until it ends or Ctrl-C. Listings received before an
/// interrupt are kept; `dispose` in `main` closes the stream.
async fn run_stream(controller: &mut Controller<HttpListingSource>, target: &str) {
    controller.open_stream(target);

    while controller.is_busy() {
        tokio::select! {
            updates = controller.next_update() => {
                for update in updates {
                    report(&update);
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Interrupted, closing stream");
                break;
            }
        }
    }

    print!("{}", render::page(1, controller.items()));
}

fn report(update: &ControllerUpdate) {
    match update {
        ControllerUpdate::ItemsStreamed { total, .. } => info!(total, "Listings received"),
        ControllerUpdate::StreamCompleted(summary) => {
            info!(count = summary.count, "Stream complete");
        }
        ControllerUpdate::Failed(error) => warn!(error = %error, "Stream failed"),
        _ => {}
    }
}
