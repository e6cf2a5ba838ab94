//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryCheckpointStore` satisfies the `CheckpointStore` contract without
//! touching the filesystem, and counts writes so tests can assert that a
//! cached stage was not recomputed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory checkpoint store backed by a `HashMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    store: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        let mut keys: Vec<String> = store.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let mut store = self.store.lock().unwrap();
        store.insert(key.to_string(), data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let store = self.store.lock().unwrap();
        store
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn contains(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let store = self.store.lock().unwrap();
        Ok(store.contains_key(key))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let mut store = self.store.lock().unwrap();
        store.remove(key);
        Ok(())
    }
}
