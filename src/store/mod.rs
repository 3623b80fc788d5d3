//! Ordered-list and key-value storage used by the pipeline.
//!
//! The pipeline only needs a handful of operations from its store:
//!
//! - [`ListStore::range`]: read a slice of a list, newest first
//! - [`ListStore::push_many`]: prepend records, keeping their given order
//! - [`ListStore::trim`]: drop everything outside an index window
//! - [`ListStore::push_trimmed`]: push and trim as one step
//! - [`KeyValueStore::get`] / [`KeyValueStore::set`]: the throttle state record
//!
//! Indices follow Redis list conventions: both ends are inclusive and
//! negative values count from the tail (`-1` is the last element).
//!
//! # Backends
//!
//! - [`memory`]: in-process maps, used by tests and dry runs
//! - [`file`]: one JSON file per key under a data directory

use crate::error::{IngestError, Result};
use std::ops::Range;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait ListStore {
    /// Return the elements between `start` and `stop` (inclusive).
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Prepend `values` so that `values[0]` becomes the new head.
    ///
    /// Returns the list length after the push.
    async fn push_many(&self, key: &str, values: &[String]) -> Result<usize>;

    /// Keep only the elements between `start` and `stop` (inclusive).
    async fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()>;

    /// Prepend `values`, then cap the list at `max_len` elements.
    ///
    /// Backends that can do both under one lock should override this so a
    /// reader never sees the list over its cap.
    async fn push_trimmed(&self, key: &str, values: &[String], max_len: usize) -> Result<usize> {
        let stop = cap_stop(max_len)?;
        let len = self.push_many(key, values).await?;
        self.trim(key, 0, stop).await?;
        Ok(len.min(max_len))
    }
}

pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Inclusive stop index for a list capped at `max_len` elements.
pub(crate) fn cap_stop(max_len: usize) -> Result<i64> {
    match max_len.checked_sub(1) {
        Some(stop) => Ok(stop as i64),
        None => Err(IngestError::Store("list cap must be at least 1".to_string())),
    }
}

/// Resolve Redis-style inclusive indices against a list of `len` elements.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Range<usize> {
    let len_i = len as i64;
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };

    if len == 0 || start > stop || start >= len_i {
        return 0..0;
    }
    start as usize..(stop as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_full_range() {
        assert_eq!(resolve_range(5, 0, -1), 0..5);
    }

    #[test]
    fn test_resolve_clamps_stop() {
        assert_eq!(resolve_range(3, 0, 99), 0..3);
        assert_eq!(resolve_range(3, 1, 1), 1..2);
    }

    #[test]
    fn test_resolve_negative_indices() {
        assert_eq!(resolve_range(5, -2, -1), 3..5);
        assert_eq!(resolve_range(5, -10, 1), 0..2);
    }

    #[test]
    fn test_resolve_empty_cases() {
        assert_eq!(resolve_range(0, 0, -1), 0..0);
        assert_eq!(resolve_range(5, 3, 1), 0..0);
        assert_eq!(resolve_range(5, 7, 9), 0..0);
    }

    #[test]
    fn test_cap_stop() {
        assert_eq!(cap_stop(100).unwrap(), 99);
        assert!(cap_stop(0).is_err());
    }
}
