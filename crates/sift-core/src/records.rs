//! Image records and the shared in-memory record store.
//!
//! The store is append-mostly: re-ingesting a changed file adds a second record
//! for the same path. Records for a path are only dropped after the file is deleted.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// One processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    /// Empty when captioning failed.
    pub caption: String,
    /// `YYYY-MM-DD`, local time.
    pub creation_date: String,
    /// `HH:MM:SS`, local time.
    pub creation_time: String,
}

/// A record with its relevance for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub relevance_score: f32,
}

impl QueryResult {
    pub fn new(record: ImageRecord, relevance_score: f32) -> Self {
        Self {
            record,
            relevance_score,
        }
    }
}

/// In-memory record collection shared by the query loop and the watcher.
#[derive(Debug, Default)]
pub struct RecordStore {
    items: RwLock<Vec<ImageRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records in order. No dedup by path.
    pub fn add(&self, records: impl IntoIterator<Item = ImageRecord>) {
        self.write().extend(records);
    }

    /// Copy of the current collection, in insertion order.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.read().clone()
    }

    /// First record stored for `path`.
    pub fn find(&self, path: &Path) -> Option<ImageRecord> {
        self.read().iter().find(|r| r.path == path).cloned()
    }

    /// Drop every record for `path`. Returns how many were removed.
    pub fn remove(&self, path: &Path) -> usize {
        let mut items = self.write();
        let before = items.len();
        items.retain(|r| r.path != path);
        before - items.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written Vec behind
    // (push/extend/retain), so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Vec<ImageRecord>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ImageRecord>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
pub(crate) fn record(path: &str, caption: &str, date: &str) -> ImageRecord {
    ImageRecord {
        path: PathBuf::from(path),
        caption: caption.to_string(),
        creation_date: date.to_string(),
        creation_time: "12:00:00".to_string(),
    }
}
