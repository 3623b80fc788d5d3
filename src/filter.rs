//! Eligibility rules applied to raw search results before enrichment.
//!
//! An article is eligible when its URL has not been stored in any bucket yet
//! and a domain can be parsed out of it. Rejections are routine and only
//! logged at debug level.

use crate::models::RawArticle;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Parse the host out of `url`, dropping a leading `www.`.
///
/// Returns `None` when the URL does not parse or has no host.
pub fn parse_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let domain = host.strip_prefix("www.").unwrap_or(host);
    (!domain.is_empty()).then(|| domain.to_string())
}

/// Admits articles whose URL is unseen and whose domain parses.
#[derive(Debug, Default)]
pub struct EligibilityFilter {
    seen_urls: HashSet<String>,
}

impl EligibilityFilter {
    pub fn new(seen_urls: HashSet<String>) -> Self {
        Self { seen_urls }
    }

    pub fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }

    pub fn admits(&self, article: &RawArticle) -> bool {
        if self.seen_urls.contains(&article.url) {
            debug!(url = %article.url, "Article already stored; skipping");
            return false;
        }
        if parse_domain(&article.url).is_none() {
            debug!(url = %article.url, "Cannot parse article domain; skipping");
            return false;
        }
        true
    }

    /// Keep only eligible articles, preserving their order.
    ///
    /// Also drops repeats of the same URL within `articles`, so one response
    /// cannot introduce a duplicate on its own.
    pub fn retain_eligible(&self, articles: Vec<RawArticle>) -> Vec<RawArticle> {
        let mut batch_urls = HashSet::new();
        articles
            .into_iter()
            .filter(|article| self.admits(article))
            .filter(|article| {
                let first = batch_urls.insert(article.url.clone());
                if !first {
                    debug!(url = %article.url, "Duplicate URL within response; skipping");
                }
                first
            })
            .collect()
    }
}
