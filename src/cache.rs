//! Set-once / get-many store of per-type resource lists.

use std::collections::BTreeMap;

use crate::types::ResourceInstance;

/// Error type for cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Key was already set.
    #[error("cache key already set: {0}")]
    DuplicateKey(String),
    /// Key was never set.
    #[error("cache key not found: {0}")]
    NotFound(String),
}

/// Write-once cache of resolved resource lists, keyed by resource type.
///
/// There is no update or delete. One cache is created per run.
#[derive(Debug, Clone)]
pub struct ResourceCache<T = ResourceInstance> {
    entries: BTreeMap<String, Vec<T>>,
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> ResourceCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `resources` under `key`.
    pub fn set(&mut self, key: impl Into<String>, resources: Vec<T>) -> Result<(), CacheError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(CacheError::DuplicateKey(key));
        }
        self.entries.insert(key, resources);
        Ok(())
    }

    /// Fetch the list stored under `key`.
    pub fn get(&self, key: &str) -> Result<&[T], CacheError> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Whether `key` has been set.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
