//! Redb-backed durable key storage.
//!
//! Uses Redb's ACID transactions for crash safety and its file lock for
//! exclusive access: two processes cannot open the pool at once, which
//! enforces the single-writer discipline the key lifecycle depends on.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{KeyStorage, StorageError, StoredKeyRecord};

/// Table: one_time_keys
/// Key: X25519 public key bytes [32 bytes]
/// Value: CBOR-encoded `StoredKeyRecord`
const ONE_TIME_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("one_time_keys");

/// Durable key storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbKeyStorage {
    db: Arc<Database>,
}

impl RedbKeyStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened,
    /// including when another process already holds the file lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ONE_TIME_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyStorage for RedbKeyStorage {
    fn put(&self, record: &StoredKeyRecord) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table =
                txn.open_table(ONE_TIME_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut bytes = Vec::new();
            ciborium::into_writer(record, &mut bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            table
                .insert(record.public.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn load_all(&self) -> Result<Vec<StoredKeyRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ONE_TIME_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut records = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (_, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let record: StoredKeyRecord = ciborium::from_reader(value.value())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(public: u8, consumed: bool) -> StoredKeyRecord {
        StoredKeyRecord {
            public: [public; 32],
            secret: [public.wrapping_add(1); 32],
            consumed,
            created_at: u64::from(public),
        }
    }

    #[test]
    fn put_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbKeyStorage::open(dir.path().join("keys.redb")).unwrap();

        storage.put(&record(1, false)).unwrap();
        storage.put(&record(2, true)).unwrap();

        let mut loaded = storage.load_all().unwrap();
        loaded.sort_by_key(|r| r.created_at);
        assert_eq!(loaded, vec![record(1, false), record(2, true)]);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.redb");

        {
            let storage = RedbKeyStorage::open(&path).unwrap();
            storage.put(&record(5, false)).unwrap();
        }

        let storage = RedbKeyStorage::open(&path).unwrap();
        let loaded = storage.load_all().unwrap();
        assert_eq!(loaded, vec![record(5, false)]);
    }

    #[test]
    fn consumed_flag_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.redb");

        {
            let storage = RedbKeyStorage::open(&path).unwrap();
            storage.put(&record(5, false)).unwrap();
            storage.put(&record(5, true)).unwrap();
        }

        let storage = RedbKeyStorage::open(&path).unwrap();
        let loaded = storage.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].consumed);
    }

    #[test]
    fn empty_store_loads_empty() {
        let dir = tempdir().unwrap();
        let storage = RedbKeyStorage::open(dir.path().join("keys.redb")).unwrap();
        assert!(storage.load_all().unwrap().is_empty());
    }
}
