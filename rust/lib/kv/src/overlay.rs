use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};

use crate::error::KVError;
use crate::traits::KVStore;

/// OverlayKV is a two-layer KV store:
///
/// - **File layer** (read-only, higher priority): reference data loaded from
///   the data dir (catalog entries and collector profiles).
/// - **DB layer** (read-write): backed by a concrete KVStore (e.g. redb).
///
/// Reads check the file layer first. Writes only reach the DB layer;
/// writing a file-layer key returns `KVError::ReadOnly`.
pub struct OverlayKV<DB: KVStore> {
    file_layer: RwLock<BTreeMap<String, Vec<u8>>>,
    db: DB,
}

impl<DB: KVStore> OverlayKV<DB> {
    /// Create a new OverlayKV with an empty file layer and the given DB backend.
    pub fn new(db: DB) -> Self {
        Self {
            file_layer: RwLock::new(BTreeMap::new()),
            db,
        }
    }

    /// Insert a key-value pair into the read-only file layer.
    /// This is called by FileLoader during initialization.
    pub fn insert_file_entry(&self, key: String, value: Vec<u8>) {
        let mut layer = self
            .file_layer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        layer.insert(key, value);
    }

    /// Get the number of entries in the file layer.
    pub fn file_layer_len(&self) -> usize {
        self.files().len()
    }

    fn files(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.file_layer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_writable(&self, key: &str) -> Result<(), KVError> {
        if self.is_readonly(key) {
            return Err(KVError::ReadOnly(key.to_string()));
        }
        Ok(())
    }
}

impl<DB: KVStore> KVStore for OverlayKV<DB> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        if let Some(value) = self.files().get(key) {
            return Ok(Some(value.clone()));
        }
        self.db.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        self.ensure_writable(key)?;
        self.db.set(key, value)
    }

    fn insert_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, KVError> {
        // A file-layer key always "exists".
        if self.is_readonly(key) {
            return Ok(false);
        }
        self.db.insert_if_absent(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.ensure_writable(key)?;
        self.db.delete(key)
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> Result<(), KVError> {
        // Fail before touching the DB layer: no partial writes.
        for (key, _) in entries {
            self.ensure_writable(key)?;
        }
        self.db.batch_set(entries)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let mut merged: BTreeMap<String, Vec<u8>> = self.db.scan(prefix)?.into_iter().collect();

        // File layer wins on conflict.
        for (key, value) in self.files().range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }

        Ok(merged.into_iter().collect())
    }

    fn is_readonly(&self, key: &str) -> bool {
        self.files().contains_key(key)
    }
}
