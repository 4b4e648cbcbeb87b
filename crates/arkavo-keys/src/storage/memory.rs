//! In-memory storage implementation for tests and simulations.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{KeyStorage, StorageError, StoredKeyRecord};

/// Volatile key storage backed by a `HashMap`.
///
/// Clone shares the same underlying map. Useful for tests; offers none
/// of the durability the production pool requires.
#[derive(Clone, Default)]
pub struct MemoryKeyStorage {
    records: Arc<Mutex<HashMap<[u8; 32], StoredKeyRecord>>>,
}

impl MemoryKeyStorage {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn put(&self, record: &StoredKeyRecord) -> Result<(), StorageError> {
        let mut records = self.records.lock().expect("MemoryKeyStorage mutex poisoned");
        records.insert(record.public, record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<StoredKeyRecord>, StorageError> {
        let records = self.records.lock().expect("MemoryKeyStorage mutex poisoned");
        Ok(records.values().cloned().collect())
    }
}
