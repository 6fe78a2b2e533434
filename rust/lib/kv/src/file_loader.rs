use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::KVError;
use crate::overlay::OverlayKV;
use crate::traits::KVStore;

/// Catalog sub-directories and the key kind each one maps to.
const CATALOG_KINDS: &[(&str, &str)] = &[
    ("brands", "brand"),
    ("models", "model"),
    ("product-types", "product-type"),
];

/// FileLoader scans a reference directory and populates the file layer of an
/// OverlayKV. The directory structure determines the key namespace:
///
/// ```text
/// reference/
/// ├── catalog/brands/dell.yaml             → config:catalog:brand:dell
/// ├── catalog/models/optiplex-7090.yaml    → config:catalog:model:optiplex-7090
/// ├── catalog/product-types/desktop.yaml   → config:catalog:product-type:desktop
/// ├── collectors/ana-ruiz.yaml             → config:collector:ana-ruiz
/// └── company.yaml                         → config:company
/// ```
///
/// All loaded entries become read-only in the overlay.
pub struct FileLoader;

impl FileLoader {
    /// Load all YAML files from `dir` into the overlay's file layer.
    /// Returns the number of entries loaded.
    pub fn load<DB: KVStore>(dir: &Path, overlay: &OverlayKV<DB>) -> Result<usize, KVError> {
        if !dir.is_dir() {
            debug!("FileLoader: reference dir {:?} does not exist, skipping", dir);
            return Ok(0);
        }

        let mut count = Self::load_directory(dir, "config:", overlay)?;

        let catalog_dir = dir.join("catalog");
        if catalog_dir.is_dir() {
            for (sub, kind) in CATALOG_KINDS {
                let kind_dir = catalog_dir.join(sub);
                if kind_dir.is_dir() {
                    let prefix = format!("config:catalog:{}:", kind);
                    count += Self::load_directory(&kind_dir, &prefix, overlay)?;
                }
            }
            Self::warn_unknown_catalog_dirs(&catalog_dir)?;
        }

        let collectors_dir = dir.join("collectors");
        if collectors_dir.is_dir() {
            count += Self::load_directory(&collectors_dir, "config:collector:", overlay)?;
        }

        debug!("FileLoader: loaded {} entries from {:?}", count, dir);
        Ok(count)
    }

    /// Load a flat directory of YAML files with a key prefix.
    /// E.g. brands/dell.yaml with prefix "config:catalog:brand:" → "config:catalog:brand:dell"
    fn load_directory<DB: KVStore>(
        dir: &Path,
        prefix: &str,
        overlay: &OverlayKV<DB>,
    ) -> Result<usize, KVError> {
        let mut count = 0;
        for entry in fs::read_dir(dir).map_err(KVError::storage)? {
            let path = entry.map_err(KVError::storage)?.path();
            if !path.is_file() || !Self::is_yaml(&path) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("FileLoader: skipping non UTF-8 file name {:?}", path);
                continue;
            };

            let data = fs::read(&path).map_err(KVError::storage)?;
            overlay.insert_file_entry(format!("{}{}", prefix, stem), data);
            count += 1;
        }
        Ok(count)
    }

    fn warn_unknown_catalog_dirs(catalog_dir: &Path) -> Result<(), KVError> {
        for entry in fs::read_dir(catalog_dir).map_err(KVError::storage)? {
            let path = entry.map_err(KVError::storage)?.path();
            if !path.is_dir() {
                continue;
            }
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if !CATALOG_KINDS.iter().any(|(sub, _)| *sub == name) {
                warn!("FileLoader: unknown catalog directory {:?}, skipping", path);
            }
        }
        Ok(())
    }

    fn is_yaml(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}
