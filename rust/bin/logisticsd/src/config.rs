//! Server configuration (`/etc/logistics/<context>.toml`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use logistics_fulfillment::FulfillmentConfig;

const CONFIG_DIR: &str = "/etc/logistics";

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of the redb file and the reference-data tree.
    pub data_dir: String,

    /// Overrides `{data_dir}/data.redb`.
    #[serde(default)]
    pub db_path: Option<String>,

    /// Overrides `{data_dir}/reference`.
    #[serde(default)]
    pub reference_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
}

impl ServerConfig {
    /// A bare context name maps to `/etc/logistics/<name>.toml`; anything
    /// that looks like a path is used as is.
    pub fn resolve_path(context_or_path: &str) -> PathBuf {
        if context_or_path.contains('/') || context_or_path.contains('.') {
            PathBuf::from(context_or_path)
        } else {
            Path::new(CONFIG_DIR).join(format!("{context_or_path}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Storage settings in the shape the core crates expect.
    pub fn service_config(&self, listen: &str) -> logistics_core::ServiceConfig {
        logistics_core::ServiceConfig {
            data_dir: Some(PathBuf::from(&self.storage.data_dir)),
            db_path: self.storage.db_path.as_ref().map(PathBuf::from),
            listen: listen.to_string(),
        }
    }

    pub fn reference_dir(&self, core: &logistics_core::ServiceConfig) -> PathBuf {
        self.storage
            .reference_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| core.resolve_reference_dir())
    }
}

/// Refuse to start on settings that cannot work.
pub fn verify(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.trim().is_empty() {
        anyhow::bail!("storage.data_dir is empty in configuration.");
    }
    if config.fulfillment.box_number_floor == 0 {
        anyhow::bail!("fulfillment.box_number_floor must be greater than zero.");
    }
    if config.fulfillment.unnamed_label.trim().is_empty() {
        anyhow::bail!("fulfillment.unnamed_label is empty in configuration.");
    }
    Ok(())
}
