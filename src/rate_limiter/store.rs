//! Key-value persistence used by the client limiter.
//!
//! Bucket snapshots are written through [`KeyValueStore`], so callers can
//! plug in a file, a bridge to client storage, or nothing at all.

use crate::error::StoreError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Deletes a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Snapshot of a bucket written after every limit check.
///
/// Serialized as camelCase JSON (`tokens`, `lastRefill`, `resetTime`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBucket {
    /// Whole tokens remaining after the check.
    pub tokens: u64,
    /// When the snapshot was taken (ms).
    pub last_refill: u64,
    /// When the window is considered reset (ms).
    pub reset_time: u64,
}

/// Storage key for a limiter key.
#[inline]
pub(crate) fn storage_key(key: &str) -> String {
    format!("rate_limit_{key}")
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String, ahash::RandomState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// A store that fails every operation. Stands in for disabled or full storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("storage disabled".into()))
    }
}
