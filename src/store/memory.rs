//! In-process store backed by hash maps.

use super::{KeyValueStore, ListStore, cap_stop, resolve_range};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    lists: HashMap<String, Vec<String>>,
    values: HashMap<String, String>,
}

/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list_len(&self, key: &str) -> usize {
        self.inner.read().await.lists.get(key).map_or(0, Vec::len)
    }
}

fn prepend(list: &mut Vec<String>, values: &[String]) {
    let mut merged = Vec::with_capacity(values.len() + list.len());
    merged.extend_from_slice(values);
    merged.append(list);
    *list = merged;
}

fn retain_window(list: &mut Vec<String>, start: i64, stop: i64) {
    let window = resolve_range(list.len(), start, stop);
    let kept: Vec<String> = list.drain(window).collect();
    *list = kept;
}

impl ListStore for MemoryStore {
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .lists
            .get(key)
            .map(|list| list[resolve_range(list.len(), start, stop)].to_vec())
            .unwrap_or_default())
    }

    async fn push_many(&self, key: &str, values: &[String]) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        prepend(list, values);
        Ok(list.len())
    }

    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(list) = inner.lists.get_mut(key) {
            retain_window(list, start, stop);
        }
        Ok(())
    }

    async fn push_trimmed(&self, key: &str, values: &[String], max_len: usize) -> Result<usize> {
        let stop = cap_stop(max_len)?;
        let mut inner = self.inner.write().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        prepend(list, values);
        retain_window(list, 0, stop);
        Ok(list.len())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
