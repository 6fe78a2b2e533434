use serde::Deserialize;

/// Lowest box number ever issued.
pub const DEFAULT_BOX_NUMBER_FLOOR: u64 = 10001;

/// Display name used when the collector is explicitly left unnamed.
pub const DEFAULT_UNNAMED_LABEL: &str = "Recolector sin nombre";

/// Tunables for the fulfillment module.
///
/// Embedded as the `[fulfillment]` table of the server config; every field
/// has a default so an absent table is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// No box number below this is ever issued.
    pub box_number_floor: u64,

    /// Label shown for an explicitly unnamed collector.
    pub unnamed_label: String,

    /// Recorded as the closing operator when a finalize request names none.
    pub default_operator: Option<String>,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            box_number_floor: DEFAULT_BOX_NUMBER_FLOOR,
            unnamed_label: DEFAULT_UNNAMED_LABEL.to_string(),
            default_operator: None,
        }
    }
}
