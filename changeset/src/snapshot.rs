//! Latest known content per path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::FileContent;
use crate::path::FilePath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub path: FilePath,
    pub content: FileContent,
    /// 1 on creation, +1 on every later put. Restarts at 1 after a remove.
    pub revision: u64,
}

/// Session-scoped store used as the diff base for the next edit of a path.
///
/// Holds at most one entry per path. Not shared across sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    entries: BTreeMap<FilePath, SnapshotEntry>,
}

impl WorkspaceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &FilePath) -> Option<&FileContent> {
        self.entries.get(path).map(|entry| &entry.content)
    }

    pub fn entry(&self, path: &FilePath) -> Option<&SnapshotEntry> {
        self.entries.get(path)
    }

    pub fn revision(&self, path: &FilePath) -> Option<u64> {
        self.entries.get(path).map(|entry| entry.revision)
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        self.entries.contains_key(path)
    }

    /// Create or replace the entry for `path`; returns the new revision.
    pub fn put(&mut self, path: FilePath, content: FileContent) -> u64 {
        match self.entries.get_mut(&path) {
            Some(entry) => {
                entry.content = content;
                entry.revision += 1;
                entry.revision
            }
            None => {
                self.entries.insert(
                    path.clone(),
                    SnapshotEntry {
                        path,
                        content,
                        revision: 1,
                    },
                );
                1
            }
        }
    }

    pub fn remove(&mut self, path: &FilePath) -> Option<SnapshotEntry> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FilePath> {
        self.entries.keys()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
