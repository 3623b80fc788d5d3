//! YAML settings: which domains feed which bucket, and how much to keep.
//!
//! # Example
//!
//! ```yaml
//! max_articles: 100
//! page_size: 100
//! language: en
//! sort_by: publishedAt
//! subscription_domains: [nytimes.com, wsj.com]
//! buckets:
//!   left: [msnbc.com, nytimes.com]
//!   center: [apnews.com, nytimes.com]
//!   right: [foxnews.com, wsj.com]
//! ```
//!
//! `domains` may be given to query a different set than the bucket union;
//! by default the monitored set is every bucket domain, de-duplicated.

use crate::error::{IngestError, Result};
use crate::models::Bucket;
use crate::newsapi::SortBy;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Largest page the news-search API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

fn default_max_articles() -> usize {
    100
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Domain substrings per bucket.
    pub buckets: BTreeMap<Bucket, Vec<String>>,
    /// Domain substrings of paywalled outlets.
    #[serde(default)]
    pub subscription_domains: Vec<String>,
    /// Per-bucket list cap.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    /// Upstream result ordering; the API default when unset.
    #[serde(default)]
    pub sort_by: Option<SortBy>,
}

impl Settings {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).await.map_err(|e| {
            IngestError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        let settings = Self::from_yaml(&raw)?;
        info!(
            domains = settings.monitored_domains().len(),
            max_articles = settings.max_articles,
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut settings: Settings =
            serde_yaml::from_str(raw).map_err(|e| IngestError::Config(e.to_string()))?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    fn normalize(&mut self) {
        let clean = |list: &mut Vec<String>| {
            *list = list
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
        };
        self.buckets.values_mut().for_each(clean);
        clean(&mut self.subscription_domains);
        if let Some(domains) = self.domains.as_mut() {
            clean(domains);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitored_domains().is_empty() {
            return Err(IngestError::Config("no domains to monitor".to_string()));
        }
        if self.max_articles == 0 {
            return Err(IngestError::Config("max_articles must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(IngestError::Config(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }

    /// Domains to query: the explicit list if set, otherwise the union of all buckets.
    pub fn monitored_domains(&self) -> Vec<String> {
        match &self.domains {
            Some(domains) => domains.iter().unique().cloned().collect(),
            None => self.buckets.values().flatten().unique().sorted().cloned().collect(),
        }
    }
}
