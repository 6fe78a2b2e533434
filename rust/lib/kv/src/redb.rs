use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, Table, TableDefinition};

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// RedbStore is a KVStore implementation backed by redb, a pure-Rust embedded
/// key-value database. All keys are read-write (not read-only).
///
/// Every write runs in its own redb write transaction; redb serializes write
/// transactions, which is what makes `insert_if_absent` a real CAS.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(KVError::storage)?;
        let store = Self { db: Arc::new(db) };

        // Ensure the table exists so that read transactions never see it missing.
        store.write(|_| Ok(()))?;
        Ok(store)
    }

    /// Run `f` inside one write transaction and commit it.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut Table<'_, &'static str, &'static [u8]>) -> Result<R, KVError>,
    ) -> Result<R, KVError> {
        let txn = self.db.begin_write().map_err(KVError::storage)?;
        let result = {
            let mut table = txn.open_table(TABLE).map_err(KVError::storage)?;
            f(&mut table)?
        };
        txn.commit().map_err(KVError::storage)?;
        Ok(result)
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let txn = self.db.begin_read().map_err(KVError::storage)?;
        let table = txn.open_table(TABLE).map_err(KVError::storage)?;
        let value = table.get(key).map_err(KVError::storage)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        self.write(|table| {
            table.insert(key, value).map_err(KVError::storage)?;
            Ok(())
        })
    }

    fn insert_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, KVError> {
        self.write(|table| {
            if table.get(key).map_err(KVError::storage)?.is_some() {
                return Ok(false);
            }
            table.insert(key, value).map_err(KVError::storage)?;
            Ok(true)
        })
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.write(|table| {
            table.remove(key).map_err(KVError::storage)?;
            Ok(())
        })
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> Result<(), KVError> {
        self.write(|table| {
            for (key, value) in entries {
                table.insert(*key, *value).map_err(KVError::storage)?;
            }
            Ok(())
        })
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let txn = self.db.begin_read().map_err(KVError::storage)?;
        let table = txn.open_table(TABLE).map_err(KVError::storage)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(KVError::storage)? {
            let (key, value) = entry.map_err(KVError::storage)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }

        Ok(results)
    }

    fn is_readonly(&self, _key: &str) -> bool {
        false
    }
}
