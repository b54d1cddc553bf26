//! Storage backends for cache entries.

use std::error::Error as StdError;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::{CacheEntry, CacheKey};

/// Errors a [`Store`] may report. The engine treats all of them as
/// non-fatal: a failed read is a miss, a failed write leaves the response
/// uncached.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable")]
    Unavailable,

    #[error("cache store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// Async key/value storage for [`CacheEntry`] values.
///
/// Concurrent `set` calls for the same key may race; implementations only
/// need last-write-wins semantics.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Stores `entry` under `key`, replacing any previous entry, and returns
    /// the stored entry.
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<CacheEntry, StoreError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Removes every entry.
    async fn flush(&self) -> Result<(), StoreError>;
}

/// In-process [`Store`] backed by a sharded concurrent map.
///
/// Entries are never evicted; pair with [`Store::delete`] or
/// [`Store::flush`] to bound memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<CacheEntry, StoreError> {
        self.entries.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}
