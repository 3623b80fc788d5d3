//! Normalization of raw search results and bucket assignment.
//!
//! [`Classifier::normalize`] turns one [`RawArticle`] into an [`Article`]:
//!
//! - `description` falls back to `title` when blank, `content` to `description`
//! - the upstream truncation marker (`[+1234 chars]`) is removed from `content`
//! - `publishedAt` is reformatted for display, e.g. `March 04, 2024 09:15 PM`
//! - `subscription` is set when the domain contains a paywalled domain
//!
//! [`Classifier::classify`] then files each article under every bucket that
//! has a domain contained in the article's domain. Articles matching no
//! bucket are dropped quietly.

use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::filter::parse_domain;
use crate::models::{Article, Bucket, RawArticle};
use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

/// Timestamp format of the news-search API.
pub const UPSTREAM_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Display format of stored records.
pub const DISPLAY_DATE_FORMAT: &str = "%B %d, %Y %I:%M %p";

static TRUNCATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\+\d+ chars\]").expect("truncation marker regex"));

/// Remove every `[+N chars]` marker from `content`.
pub fn strip_truncation_marker(content: &str) -> String {
    TRUNCATION_MARKER.replace_all(content, "").into_owned()
}

/// Reformat an upstream timestamp for display.
///
/// Accepts the API's usual `2024-03-04T21:15:00Z` and, failing that, any
/// RFC 3339 timestamp (converted to UTC).
pub fn format_published_at(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = NaiveDateTime::parse_from_str(raw, UPSTREAM_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc()))
        .map_err(|e| IngestError::Normalization(format!("bad publishedAt `{raw}`: {e}")))?;
    Ok(parsed.format(DISPLAY_DATE_FORMAT).to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct Classifier {
    buckets: BTreeMap<Bucket, Vec<String>>,
    subscription_domains: Vec<String>,
}

impl Classifier {
    pub fn new(buckets: BTreeMap<Bucket, Vec<String>>, subscription_domains: Vec<String>) -> Self {
        Self {
            buckets,
            subscription_domains,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.buckets.clone(), settings.subscription_domains.clone())
    }

    pub fn is_subscription(&self, domain: &str) -> bool {
        self.subscription_domains.iter().any(|d| domain.contains(d.as_str()))
    }

    /// Buckets with at least one domain contained in `domain`, in bucket order.
    pub fn buckets_for(&self, domain: &str) -> Vec<Bucket> {
        self.buckets
            .iter()
            .filter(|(_, domains)| domains.iter().any(|d| domain.contains(d.as_str())))
            .map(|(bucket, _)| *bucket)
            .collect()
    }

    /// Build the normalized record for `raw`.
    ///
    /// # Errors
    ///
    /// [`IngestError::Normalization`] when the domain cannot be parsed or the
    /// publication timestamp is missing or unparseable.
    pub fn normalize(&self, raw: RawArticle, amp_lookup: &HashMap<String, String>) -> Result<Article> {
        let domain = parse_domain(&raw.url)
            .ok_or_else(|| IngestError::Normalization(format!("no domain in `{}`", raw.url)))?;
        let published_at = raw
            .published_at
            .as_deref()
            .ok_or_else(|| IngestError::Normalization(format!("no publishedAt for `{}`", raw.url)))
            .and_then(format_published_at)?;

        let title = non_blank(raw.title).unwrap_or_default();
        let description = non_blank(raw.description).unwrap_or_else(|| title.clone());
        let content = non_blank(raw.content).unwrap_or_else(|| description.clone());

        Ok(Article {
            id: Uuid::new_v4(),
            source: raw.source.and_then(|s| s.name),
            title,
            author: non_blank(raw.author),
            description,
            amp_url: amp_lookup.get(&raw.url).cloned(),
            image_url: non_blank(raw.url_to_image),
            published_at,
            content: strip_truncation_marker(&content),
            subscription: self.is_subscription(&domain),
            domain,
            url: raw.url,
        })
    }

    /// Normalize `articles` and group them by bucket, keeping their order.
    ///
    /// Articles that fail to normalize are logged and dropped; the rest of the
    /// batch is unaffected.
    pub fn classify(
        &self,
        articles: Vec<RawArticle>,
        amp_lookup: &HashMap<String, String>,
    ) -> BTreeMap<Bucket, Vec<Article>> {
        let total = articles.len();
        let mut normalized = 0usize;
        let mut pending: BTreeMap<Bucket, Vec<Article>> = BTreeMap::new();

        for raw in articles {
            let url = raw.url.clone();
            let article = match self.normalize(raw, amp_lookup) {
                Ok(article) => article,
                Err(e) => {
                    warn!(%url, error = %e, "Dropping article");
                    continue;
                }
            };
            normalized += 1;
            for bucket in self.buckets_for(&article.domain) {
                pending.entry(bucket).or_default().push(article.clone());
            }
        }

        info!(normalized, total, buckets = pending.len(), "Classified articles");
        pending
    }
}
