//! Embedded key-value storage for the logistics services.
//!
//! `RedbStore` is the read-write database; `OverlayKV` puts a read-only
//! file layer (reference YAML loaded by `FileLoader`) in front of it.

pub mod error;
pub mod file_loader;
pub mod overlay;
pub mod redb;
pub mod traits;

pub use error::KVError;
pub use file_loader::FileLoader;
pub use overlay::OverlayKV;
pub use redb::RedbStore;
pub use traits::KVStore;
