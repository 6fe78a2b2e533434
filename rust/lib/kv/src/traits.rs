use crate::error::KVError;

/// KVStore provides a key-value storage interface with read-only key support.
///
/// Keys follow a namespaced convention: `fulfillment:box:0000010001`,
/// `config:catalog:brand:dell`, etc. Keys loaded from the file layer are
/// read-only; DB-layer keys are read-write.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair. Returns KVError::ReadOnly if the key is in the read-only layer.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Insert only if the key is absent, atomically.
    ///
    /// Returns `true` if the value was written, `false` if the key already
    /// existed (nothing is written in that case).
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Write several keys in one transaction: all or nothing.
    fn batch_set(&self, entries: &[(&str, &[u8])]) -> Result<(), KVError>;

    /// Scan all keys matching a prefix. Returns sorted (key, value) pairs.
    /// Merges both file-layer and DB-layer results when applicable.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;

    /// Check whether a key is in the read-only (file) layer.
    fn is_readonly(&self, key: &str) -> bool;
}
