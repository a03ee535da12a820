// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value storage port.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("entity already exists: {0}")]
    AlreadyExists(String),
}

/// Opaque-string-keyed storage for one record type.
///
/// Per-key operations are linearizable (last writer wins on `update`).
/// `list` makes no ordering promise across calls; `limit == 0` means
/// unbounded.
#[async_trait]
pub trait Storage<T: Clone + Send + Sync + 'static>: Send + Sync {
    /// Insert a new record; fails with `AlreadyExists` if the key is taken.
    async fn create(&self, key: &str, value: T) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<T, StorageError>;

    /// Replace an existing record; fails with `NotFound` for absent keys.
    async fn update(&self, key: &str, value: T) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Page through all records; returns `(items, total)`.
    async fn list(&self, offset: usize, limit: usize) -> Result<(Vec<T>, usize), StorageError>;
}
