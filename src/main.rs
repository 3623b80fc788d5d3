//! # unifiedpost
//!
//! A news ingestion service that continuously polls a news-search API,
//! files the results into left / center / right buckets, enriches them with
//! AMP mirror links, and keeps the newest records of each bucket in a
//! bounded, ordered store.
//!
//! ## Usage
//!
//! ```sh
//! NEWSAPI_API_KEY=... GOOGLE_API_KEY=... unifiedpost run --plan developer
//! unifiedpost show --bucket left --limit 20
//! ```
//!
//! ## Architecture
//!
//! The `run` command drives one long-lived loop, chunk by chunk:
//! 1. **Throttle**: wait until the subscription plan allows another call
//! 2. **Query**: search the chunk's domains, retrying transient failures
//! 3. **Filter**: drop URLs already stored in any bucket
//! 4. **Enrich**: look up AMP mirrors in batches of 50
//! 5. **Classify**: normalize articles and assign buckets
//! 6. **Persist**: prepend to each bucket list and trim it to its cap

use clap::Parser;
use reqwest::Client;
use std::error::Error;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod amp;
mod classify;
mod cli;
mod config;
mod error;
mod filter;
mod ingest;
mod models;
mod newsapi;
mod partition;
mod persist;
mod retry;
mod store;
mod throttle;
mod utils;

use amp::GoogleAmpClient;
use cli::{Cli, Command, RunArgs, ShowArgs};
use config::Settings;
use ingest::Ingester;
use newsapi::NewsApiClient;
use persist::PersistenceGateway;
use retry::RetrySearch;
use store::{FileStore, KeyValueStore, ListStore, MemoryStore};

/// Upper bound on a single HTTP exchange with either upstream.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "unifiedpost starting up");
    debug!(config = %args.config.display(), store_dir = %args.store_dir.display(), "Parsed CLI arguments");

    match args.command {
        Command::Run(run) if run.dry_run => {
            warn!("Dry run: results are kept in memory and discarded on exit");
            run_ingester(&args.config, run, MemoryStore::new()).await?
        }
        Command::Run(run) => {
            let store = open_store(&args.store_dir).await?;
            run_ingester(&args.config, run, store).await?
        }
        Command::Show(show) => show_bucket(show, open_store(&args.store_dir).await?).await?,
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}

async fn open_store(dir: &Path) -> Result<FileStore, Box<dyn Error>> {
    let store = FileStore::open(dir).await.inspect_err(|e| {
        error!(path = %dir.display(), error = %e, "Store directory is not usable");
    })?;
    debug!(root = %store.root().display(), "Using file store");
    Ok(store)
}

/// Poll until ctrl-c.
#[instrument(level = "info", skip_all, fields(plan = ?run.plan))]
async fn run_ingester<S>(config: &Path, run: RunArgs, store: S) -> Result<(), Box<dyn Error>>
where
    S: ListStore + KeyValueStore + Clone,
{
    let settings = Settings::load(config).await?;

    let http = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("unifiedpost/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let search = RetrySearch::with_defaults(NewsApiClient::new(http.clone(), run.newsapi_key));
    let amp = run
        .google_api_key
        .map(|key| GoogleAmpClient::new(http, key, run.amp_strategy));
    if amp.is_none() {
        warn!("No Google API key configured; AMP enrichment disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown_tx.send_replace(true);
            }
            Err(e) => error!(error = %e, "Cannot listen for ctrl-c; stop the process to exit"),
        }
    });

    let mut ingester = Ingester::new(&settings, search, amp, run.plan, store);
    ingester.run(shutdown_rx).await?;
    Ok(())
}

/// Print the newest records of one bucket, one JSON object per line.
async fn show_bucket(show: ShowArgs, store: FileStore) -> Result<(), Box<dyn Error>> {
    let gateway = PersistenceGateway::new(store, show.limit.max(1));
    let articles = gateway.recent(show.bucket, show.limit).await?;
    info!(bucket = %show.bucket, count = articles.len(), "Read bucket");

    for article in &articles {
        println!("{}", serde_json::to_string(article)?);
    }
    Ok(())
}
