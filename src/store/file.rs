//! Durable directory-backed store.
//!
//! Each list key is kept in its own JSON file holding an array of record
//! strings, newest first; each value key is a small text file. Writes go to
//! a temporary file that is then renamed over the target, so readers see
//! either the old or the new list and never a partial one.
//!
//! # Layout
//!
//! ```text
//! store_dir/
//! ├── parser_results_left.json
//! ├── parser_results_center.json
//! ├── parser_results_right.json
//! └── newsapi_throttle_last_call_at.value
//! ```

use super::{KeyValueStore, ListStore, cap_stop, resolve_range};
use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: Arc<PathBuf>,
    /// Serializes read-modify-write cycles across clones.
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    #[instrument(level = "info", skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!("File store ready");
        Ok(Self {
            root: Arc::new(root),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str, extension: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{file_stem}.{extension}"))
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        match fs::read_to_string(self.path_for(key, "json")).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_list(&self, key: &str, list: &[String]) -> Result<()> {
        let json = serde_json::to_string(list)?;
        write_atomically(&self.path_for(key, "json"), json.as_bytes()).await
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote store file");
    Ok(())
}

impl ListStore for FileStore {
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let list = self.read_list(key).await?;
        Ok(list[resolve_range(list.len(), start, stop)].to_vec())
    }

    async fn push_many(&self, key: &str, values: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut list = values.to_vec();
        list.extend(self.read_list(key).await?);
        self.write_list(key, &list).await?;
        Ok(list.len())
    }

    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let list = self.read_list(key).await?;
        let window = resolve_range(list.len(), start, stop);
        self.write_list(key, &list[window]).await
    }

    async fn push_trimmed(&self, key: &str, values: &[String], max_len: usize) -> Result<usize> {
        let stop = cap_stop(max_len)?;
        let _guard = self.write_lock.lock().await;
        let mut list = values.to_vec();
        list.extend(self.read_list(key).await?);
        let window = resolve_range(list.len(), 0, stop);
        self.write_list(key, &list[window.clone()]).await?;
        Ok(window.len())
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key, "value")).await {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomically(&self.path_for(key, "value"), value.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_to_file_name() {
        let store = FileStore {
            root: Arc::new(PathBuf::from("/data")),
            write_lock: Arc::new(Mutex::new(())),
        };
        assert_eq!(
            store.path_for("parser:results:left", "json"),
            PathBuf::from("/data/parser_results_left.json")
        );
    }

    #[tokio::test]
    async fn test_lists_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.push_many("parser:results:left", &strings(&["b"])).await.unwrap();
            store.push_many("parser:results:left", &strings(&["a"])).await.unwrap();
        }

        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.range("parser:results:left", 0, -1).await.unwrap(),
            strings(&["a", "b"])
        );
    }

    #[tokio::test]
    async fn test_push_trimmed_caps_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.push_many("k", &strings(&["3", "4"])).await.unwrap();

        let len = store.push_trimmed("k", &strings(&["1", "2"]), 3).await.unwrap();
        assert_eq!(len, 3);
        assert_eq!(store.range("k", 0, -1).await.unwrap(), strings(&["1", "2", "3"]));
    }

    #[tokio::test]
    async fn test_trim_and_partial_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.push_many("k", &strings(&["a", "b", "c", "d"])).await.unwrap();
        store.trim("k", 0, 2).await.unwrap();

        assert_eq!(store.range("k", 1, -1).await.unwrap(), strings(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_values_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get("newsapi:throttle:last_call_at").await.unwrap(), None);
        store
            .set("newsapi:throttle:last_call_at", "1700000000.25")
            .await
            .unwrap();
        assert_eq!(
            store.get("newsapi:throttle:last_call_at").await.unwrap().as_deref(),
            Some("1700000000.25")
        );
    }
}
