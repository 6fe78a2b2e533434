use serde::{Deserialize, Serialize};

use logistics_core::ServiceError;
use logistics_kv::KVStore;

use crate::store::kv_err;

/// The three reference lists a line item is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Brand,
    Model,
    ProductType,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [Self::Brand, Self::Model, Self::ProductType];

    /// Key segment under `config:catalog:`.
    pub fn key_kind(&self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Model => "model",
            Self::ProductType => "product-type",
        }
    }

    /// Path segment under `/catalog/`.
    pub fn route_segment(&self) -> &'static str {
        match self {
            Self::Brand => "brands",
            Self::Model => "models",
            Self::ProductType => "product-types",
        }
    }

    pub fn from_route_segment(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.route_segment() == s)
    }

    fn key_prefix(&self) -> String {
        format!("config:catalog:{}:", self.key_kind())
    }
}

/// One catalog entry, as written in `catalog/<kind>/<id>.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// File stem; filled in at load time.
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Owning brand (models only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.to_lowercase(),
            name,
            brand: None,
            active: true,
        }
    }

    pub fn model_of(name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            brand: Some(brand.into()),
            ..Self::new(name)
        }
    }
}

/// Read active entries of one kind from the KV file layer, sorted by name.
pub fn load_entries(kv: &dyn KVStore, kind: CatalogKind) -> Result<Vec<CatalogEntry>, ServiceError> {
    let prefix = kind.key_prefix();
    let mut entries = Vec::new();
    for (key, raw) in kv.scan(&prefix).map_err(kv_err)? {
        let mut entry: CatalogEntry = serde_yaml::from_slice(&raw)
            .map_err(|e| ServiceError::Internal(format!("bad catalog entry {key}: {e}")))?;
        if !entry.active {
            continue;
        }
        entry.id = key[prefix.len()..].to_string();
        entries.push(entry);
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Read-only snapshot of the catalog taken when a session opens.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub brands: Vec<CatalogEntry>,
    pub models: Vec<CatalogEntry>,
    pub product_types: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(kv: &dyn KVStore) -> Result<Self, ServiceError> {
        Ok(Self {
            brands: load_entries(kv, CatalogKind::Brand)?,
            models: load_entries(kv, CatalogKind::Model)?,
            product_types: load_entries(kv, CatalogKind::ProductType)?,
        })
    }

    pub fn entries(&self, kind: CatalogKind) -> &[CatalogEntry] {
        match kind {
            CatalogKind::Brand => &self.brands,
            CatalogKind::Model => &self.models,
            CatalogKind::ProductType => &self.product_types,
        }
    }

    fn find(&self, kind: CatalogKind, name: &str) -> Option<&CatalogEntry> {
        let name = name.trim();
        self.entries(kind)
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Check a brand/model/product-type triple against the snapshot.
    ///
    /// A model that names its brand must be used with that brand.
    pub fn validate(&self, brand: &str, model: &str, product_type: &str) -> Result<(), ServiceError> {
        if self.find(CatalogKind::Brand, brand).is_none() {
            return Err(ServiceError::Validation(format!("unknown brand: {brand}")));
        }
        let Some(m) = self.find(CatalogKind::Model, model) else {
            return Err(ServiceError::Validation(format!("unknown model: {model}")));
        };
        if let Some(owner) = &m.brand {
            if !owner.eq_ignore_ascii_case(brand.trim()) {
                return Err(ServiceError::Validation(format!(
                    "model {model} does not belong to brand {brand}"
                )));
            }
        }
        if self.find(CatalogKind::ProductType, product_type).is_none() {
            return Err(ServiceError::Validation(format!(
                "unknown product type: {product_type}"
            )));
        }
        Ok(())
    }
}
