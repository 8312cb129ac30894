//! Key-value engine port.
//!
//! The rendezvous store only needs get/put/delete/exists over opaque byte
//! strings, plus a prefix scan for dropping expired entries. Engines provide no compare-and-swap; atomicity of multi-step
//! sequences is the store's job.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Engine-level failures. Every variant surfaces as "store unavailable".
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("entry codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The caller's deadline passed before the operation committed.
    /// Nothing was written or deleted.
    #[error("deadline elapsed before commit")]
    DeadlineExceeded,
}

/// Abstract interface for key-value operations.
pub trait KvEngine: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Insert or overwrite a value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), EngineError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, EngineError> {
        Ok(self.get(key)?.is_some())
    }

    /// Keys starting with `prefix`, in no particular order. Used for expiry sweeps.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, EngineError>;
}

impl<E: KvEngine + ?Sized> KvEngine for Arc<E> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        (**self).delete(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, EngineError> {
        (**self).exists(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, EngineError> {
        (**self).scan_prefix(prefix)
    }
}

/// Volatile engine backed by a concurrent hash map.
///
/// Entries live seconds to minutes, so losing them on restart matches how the
/// service is used; a fresh process starts with an empty keyspace.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    entries: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        self.entries.remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, EngineError> {
        Ok(self.entries.contains_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, EngineError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
