//! Key-value backends.

use crosslink_api::storage::KvStore;
use crosslink_types::error::StoreError;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Single table holding every ledger record, keyed by the byte-exact layout.
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("RECORDS");

/// A redb-backed [`KvStore`].
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Opens (or creates) the database file and ensures the table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let w = db
                .begin_write()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            w.open_table(RECORDS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            w.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(RedbKv { db: Arc::new(db) })
    }
}

impl KvStore for RedbKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let t = r
            .open_table(RECORDS)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let out = t
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|v| v.value().to_vec());
        Ok(out)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut t = w
                .open_table(RECORDS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            t.insert(key, value)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// An in-memory [`KvStore`] for tests.
#[derive(Clone, Default)]
pub struct MemoryKv {
    map: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .map
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self
            .map
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        guard.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redb_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = RedbKv::open(dir.path().join("ledger.redb")).unwrap();
        assert_eq!(kv.get(b"missing").unwrap(), None);
        kv.set(b"k", b"v1").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v1".to_vec()));
        kv.set(b"k", b"v2").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn memory_round_trip() {
        let kv = MemoryKv::new();
        kv.set(b"a", b"1").unwrap();
        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"b").unwrap(), None);
    }
}
