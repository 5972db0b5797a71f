//! Bounded FIFO store shared by retention and error tracking.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::RetentionResult;

/// Fixed-capacity log; pushing onto a full log evicts the oldest entry.
///
/// Readers get a copy of the entries taken under the read lock, so every
/// query sees one consistent snapshot.
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `entry`, returning the evicted one if the log was full.
    pub fn push(&self, entry: T) -> Option<T> {
        let mut entries = self.entries.write();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    /// Everything, oldest first.
    pub fn get_all(&self) -> Vec<T> {
        self.entries.read().iter().cloned().collect()
    }

    /// The `n` newest entries, newest first.
    pub fn get_recent(&self, n: usize) -> Vec<T> {
        self.entries.read().iter().rev().take(n).cloned().collect()
    }

    /// Entries matching `predicate`, oldest first.
    pub fn filter<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone + Serialize> BoundedLog<T> {
    /// JSON array of all entries, oldest first.
    pub fn export(&self) -> RetentionResult<String> {
        let snapshot = self.get_all();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Write [`export`](Self::export) to `path` through a temporary sibling
    /// file. Returns the number of exported entries.
    pub async fn export_to(&self, path: impl AsRef<Path>) -> RetentionResult<usize> {
        let path = path.as_ref();
        let snapshot = self.get_all();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), entries = snapshot.len(), "records exported");
        Ok(snapshot.len())
    }
}
