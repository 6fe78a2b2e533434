use std::path::PathBuf;

/// Where the server keeps its data and which address it binds.
///
/// Filled by `logisticsd` from its TOML file and `--listen` flag.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root of everything on disk: the redb file and `reference/`.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb database file.
    /// Defaults to `{data_dir}/data.redb` if not specified.
    pub db_path: Option<PathBuf>,

    /// Listen address for the HTTP server.
    pub listen: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_path: None,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the redb database path, falling back to `{data_dir}/data.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("data.redb"))
    }

    /// Resolve the reference-data directory (catalog, collector profiles).
    pub fn resolve_reference_dir(&self) -> PathBuf {
        self.resolve_data_subpath("reference")
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
