// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory storage backend, the default for a single-instance manager.

use crate::kv::{Storage, StorageError};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Map-backed storage with per-key linearizability via a reader-writer lock.
#[derive(Debug, Default)]
pub struct InMemoryStorage<T> {
    entries: RwLock<IndexMap<String, T>>,
}

impl<T> InMemoryStorage<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Storage<T> for InMemoryStorage<T> {
    async fn create(&self, key: &str, value: T) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<T, StorageError> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn update(&self, key: &str, value: T) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        // shift_remove keeps insertion order stable for pagination
        entries
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<(Vec<T>, usize), StorageError> {
        let entries = self.entries.read();
        let total = entries.len();
        let items = entries
            .values()
            .skip(offset)
            .take(if limit == 0 { usize::MAX } else { limit })
            .cloned()
            .collect();
        Ok((items, total))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
