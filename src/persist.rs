//! The write path into the bucket lists, plus the reads the pipeline needs.
//!
//! Every bucket is one ordered list keyed by [`Bucket::list_key`], newest
//! record at the head. [`PersistenceGateway::persist`] is the only code that
//! writes to those lists.

use crate::error::Result;
use crate::models::{Article, Bucket};
use crate::store::ListStore;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument, warn};

/// Just enough of a stored record to deduplicate on.
#[derive(Deserialize)]
struct StoredUrl {
    url: String,
}

#[derive(Debug, Clone)]
pub struct PersistenceGateway<S> {
    store: S,
    max_len: usize,
}

impl<S: ListStore> PersistenceGateway<S> {
    pub fn new(store: S, max_len: usize) -> Self {
        Self { store, max_len }
    }

    /// URLs of every record currently stored in any bucket.
    ///
    /// Records that do not parse are skipped with a warning.
    #[instrument(level = "debug", skip_all)]
    pub async fn seen_urls(&self) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        for bucket in Bucket::ALL {
            for record in self.store.range(&bucket.list_key(), 0, -1).await? {
                match serde_json::from_str::<StoredUrl>(&record) {
                    Ok(stored) => {
                        seen.insert(stored.url);
                    }
                    Err(e) => warn!(%bucket, error = %e, "Skipping unreadable stored record"),
                }
            }
        }
        info!(count = seen.len(), "Collected stored URLs");
        Ok(seen)
    }

    /// Push each bucket's pending articles onto its list head and trim the tail.
    ///
    /// Articles keep the order they were classified in, so the first pending
    /// article becomes the new head. Buckets without pending articles are not
    /// touched.
    ///
    /// # Returns
    ///
    /// The number of records written per bucket.
    #[instrument(level = "info", skip_all)]
    pub async fn persist(&self, pending: &BTreeMap<Bucket, Vec<Article>>) -> Result<BTreeMap<Bucket, usize>> {
        let mut written = BTreeMap::new();
        for (bucket, articles) in pending {
            if articles.is_empty() {
                continue;
            }
            let records = articles
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let len = self
                .store
                .push_trimmed(&bucket.list_key(), &records, self.max_len)
                .await?;
            info!(%bucket, persisted = records.len(), len, "Persisted articles");
            written.insert(*bucket, records.len());
        }
        Ok(written)
    }

    /// Up to `limit` newest records of `bucket`.
    pub async fn recent(&self, bucket: Bucket, limit: usize) -> Result<Vec<Article>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let records = self
            .store
            .range(&bucket.list_key(), 0, limit as i64 - 1)
            .await?;

        Ok(records
            .iter()
            .filter_map(|record| match serde_json::from_str::<Article>(record) {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(%bucket, error = %e, "Skipping unreadable stored record");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn article(url: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            source: None,
            title: format!("title of {url}"),
            author: None,
            description: String::new(),
            url: url.to_string(),
            amp_url: None,
            image_url: None,
            published_at: "March 04, 2024 09:15 PM".to_string(),
            content: String::new(),
            domain: "apnews.com".to_string(),
            subscription: false,
        }
    }

    fn batch(prefix: &str, n: usize) -> Vec<Article> {
        (0..n).map(|i| article(&format!("https://apnews.com/{prefix}/{i}"))).collect()
    }

    #[tokio::test]
    async fn test_persist_prepends_in_order_and_caps() {
        let store = MemoryStore::new();
        let gateway = PersistenceGateway::new(store.clone(), 5);

        gateway
            .persist(&BTreeMap::from([(Bucket::Center, batch("old", 4))]))
            .await
            .unwrap();
        gateway
            .persist(&BTreeMap::from([(Bucket::Center, batch("new", 3))]))
            .await
            .unwrap();

        assert_eq!(store.list_len(&Bucket::Center.list_key()).await, 5);
        let urls = gateway
            .recent(Bucket::Center, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.url)
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://apnews.com/new/0",
                "https://apnews.com/new/1",
                "https://apnews.com/new/2",
                "https://apnews.com/old/0",
                "https://apnews.com/old/1",
            ]
        );
    }

    #[tokio::test]
    async fn test_cap_holds_after_every_persist() {
        let store = MemoryStore::new();
        let gateway = PersistenceGateway::new(store.clone(), 7);

        for round in 0..6 {
            gateway
                .persist(&BTreeMap::from([(Bucket::Left, batch(&format!("r{round}"), 3))]))
                .await
                .unwrap();
            assert!(store.list_len(&Bucket::Left.list_key()).await <= 7);
        }
    }

    #[tokio::test]
    async fn test_empty_bucket_is_untouched() {
        let store = MemoryStore::new();
        let gateway = PersistenceGateway::new(store.clone(), 5);

        let written = gateway
            .persist(&BTreeMap::from([(Bucket::Left, Vec::new()), (Bucket::Right, batch("r", 2))]))
            .await
            .unwrap();

        assert_eq!(written, BTreeMap::from([(Bucket::Right, 2)]));
        assert_eq!(store.list_len(&Bucket::Left.list_key()).await, 0);
    }

    #[tokio::test]
    async fn test_seen_urls_spans_buckets_and_skips_garbage() {
        let store = MemoryStore::new();
        let gateway = PersistenceGateway::new(store.clone(), 10);
        gateway
            .persist(&BTreeMap::from([
                (Bucket::Left, batch("l", 2)),
                (Bucket::Right, batch("r", 1)),
            ]))
            .await
            .unwrap();
        store
            .push_many(&Bucket::Center.list_key(), &["not json".to_string()])
            .await
            .unwrap();

        let seen = gateway.seen_urls().await.unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains("https://apnews.com/r/0"));
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let gateway = PersistenceGateway::new(MemoryStore::new(), 10);
        gateway
            .persist(&BTreeMap::from([(Bucket::Left, batch("x", 6))]))
            .await
            .unwrap();

        assert_eq!(gateway.recent(Bucket::Left, 2).await.unwrap().len(), 2);
        assert!(gateway.recent(Bucket::Left, 0).await.unwrap().is_empty());
        assert!(gateway.recent(Bucket::Right, 5).await.unwrap().is_empty());
    }
}
