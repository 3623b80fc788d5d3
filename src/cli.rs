//! Command-line interface definitions for unifiedpost.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets and the store location can also be provided via environment
//! variables.

use crate::amp::LookupStrategy;
use crate::models::Bucket;
use crate::throttle::SubscriptionPlan;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Records returned by `show` when no limit is given.
pub const DEFAULT_ARTICLES_LIMIT: usize = 100;

/// Command-line arguments for the unifiedpost ingester.
///
/// # Examples
///
/// ```sh
/// # Poll forever on the developer quota, without AMP links
/// unifiedpost run --newsapi-key YOUR_KEY
///
/// # Business plan, AMP links answered from the index only
/// unifiedpost run --plan business --google-api-key KEY --amp-strategy in-index-doc
///
/// # Print the ten newest centre records
/// unifiedpost show --bucket center --limit 10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the sources.yaml settings file
    #[arg(short, long, default_value = "config/sources.yaml")]
    pub config: PathBuf,

    /// Directory holding the bucket lists and throttle state
    #[arg(short, long, env = "UNIFIEDPOST_STORE_DIR", default_value = "./data")]
    pub store_dir: PathBuf,

    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the news-search API until interrupted
    Run(RunArgs),
    /// Print the newest stored records of a bucket as JSON lines
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// News-search API key
    #[arg(long, env = "NEWSAPI_API_KEY", hide_env_values = true)]
    pub newsapi_key: String,

    /// Google API key for AMP lookups; AMP links are skipped without it
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Subscription plan, which sets the request pacing
    #[arg(long, value_enum, default_value_t = SubscriptionPlan::Developer)]
    pub plan: SubscriptionPlan,

    /// How AMP lookups resolve URLs
    #[arg(long, value_enum, default_value_t = LookupStrategy::FetchLiveDoc)]
    pub amp_strategy: LookupStrategy,

    /// Keep results in memory instead of the store directory
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Bucket to read: left, center or right
    #[arg(short, long)]
    pub bucket: Bucket,

    /// Maximum number of records
    #[arg(short, long, default_value_t = DEFAULT_ARTICLES_LIMIT)]
    pub limit: usize,
}
