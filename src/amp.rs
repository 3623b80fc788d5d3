//! AMP mirror lookup through the Google AMP URL API.
//!
//! The upstream resolves at most [`BATCH_MAX_URLS`] URLs per request, so
//! [`create_amp_lookup`] splits its input into batches and merges whatever
//! each batch resolved. Enrichment is best-effort: a failed batch is logged
//! and its URLs simply stay without an AMP link.

use crate::error::{IngestError, Result};
use crate::utils::truncate_for_log;
use clap::ValueEnum;
use itertools::Itertools;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const AMP_BATCH_GET_URL: &str =
    "https://acceleratedmobilepageurl.googleapis.com/v1/ampUrls:batchGet";

/// Upstream cap on URLs per `batchGet` request.
pub const BATCH_MAX_URLS: usize = 50;

/// How the lookup service resolves a URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStrategy {
    /// Fetch the live document when it is not in the index yet.
    #[default]
    FetchLiveDoc,
    /// Only answer from the index.
    InIndexDoc,
}

/// One batch lookup against an AMP URL service.
pub trait AmpLookup {
    /// Resolve up to [`BATCH_MAX_URLS`] URLs; unresolved URLs are absent from the map.
    async fn batch_get(&self, urls: &[String]) -> Result<HashMap<String, String>>;

    /// Whether lookups reach a service at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// No client configured: nothing resolves and no request is made.
impl<L: AmpLookup> AmpLookup for Option<L> {
    async fn batch_get(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        match self {
            Some(inner) => inner.batch_get(urls).await,
            None => Ok(HashMap::new()),
        }
    }

    fn is_enabled(&self) -> bool {
        self.as_ref().is_some_and(L::is_enabled)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetRequest<'a> {
    urls: &'a [String],
    lookup_strategy: LookupStrategy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    amp_urls: Vec<AmpUrl>,
    #[serde(default)]
    url_errors: Vec<AmpUrlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmpUrl {
    original_url: String,
    amp_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmpUrlError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    original_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleAmpClient {
    http: Client,
    api_key: String,
    strategy: LookupStrategy,
}

impl GoogleAmpClient {
    pub fn new(http: Client, api_key: impl Into<String>, strategy: LookupStrategy) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            strategy,
        }
    }
}

impl AmpLookup for GoogleAmpClient {
    #[instrument(level = "debug", skip_all, fields(urls = urls.len()))]
    async fn batch_get(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        let body = BatchGetRequest {
            urls,
            lookup_strategy: self.strategy,
        };
        let resp = self
            .http
            .post(AMP_BATCH_GET_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(IngestError::Enrichment(format!(
                "batchGet returned {status}: {}",
                truncate_for_log(&text, 300)
            )));
        }

        let parsed: BatchGetResponse = serde_json::from_str(&text).map_err(|e| {
            IngestError::Enrichment(format!("{e} (body: {})", truncate_for_log(&text, 300)))
        })?;
        for err in &parsed.url_errors {
            debug!(
                url = err.original_url.as_deref().unwrap_or("?"),
                code = err.error_code.as_deref().unwrap_or("?"),
                "No AMP mirror"
            );
        }

        Ok(parsed
            .amp_urls
            .into_iter()
            .map(|m| (m.original_url, m.amp_url))
            .collect())
    }
}

/// Resolve AMP mirrors for `urls`, one request per batch of at most 50.
///
/// # Arguments
///
/// * `lookup` - The batch lookup service
/// * `urls` - Original article URLs; duplicates are looked up once
///
/// # Returns
///
/// A map from original URL to AMP URL covering every URL that some batch
/// resolved. Failed batches are logged and skipped, so this never fails.
#[instrument(level = "info", skip_all, fields(urls = urls.len()))]
pub async fn create_amp_lookup<L: AmpLookup>(lookup: &L, urls: &[String]) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    if !lookup.is_enabled() {
        debug!("AMP enrichment disabled");
        return mapping;
    }
    let unique = urls.iter().unique().cloned().collect::<Vec<_>>();
    if unique.is_empty() {
        return mapping;
    }

    let t0 = Instant::now();
    let batches = unique.chunks(BATCH_MAX_URLS).count();
    for (index, batch) in unique.chunks(BATCH_MAX_URLS).enumerate() {
        match lookup.batch_get(batch).await {
            Ok(found) => mapping.extend(found),
            Err(e) => warn!(
                batch = index + 1,
                of = batches,
                size = batch.len(),
                error = %e,
                "AMP batch failed; continuing without AMP links"
            ),
        }
    }

    info!(
        resolved = mapping.len(),
        requested = unique.len(),
        batches,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "AMP lookup finished"
    );
    mapping
}
