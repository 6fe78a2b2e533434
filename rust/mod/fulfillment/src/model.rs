use serde::{Deserialize, Serialize};

use logistics_core::normalize_text;

// ---------------------------------------------------------------------------
// WorkOrder
// ---------------------------------------------------------------------------

/// Lifecycle state of a work order as seen by fulfillment.
///
/// ```text
/// OPEN → CLOSED   (finalize)
/// CLOSED → OPEN   (reopen)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Open,
    Closed,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line the client expects to hand over (brand/model/type and how many).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedItem {
    pub brand: String,
    pub model: String,
    pub product_type: String,
    pub expected_quantity: u32,
}

/// The order being fulfilled.
///
/// Owned by the order-management side; fulfillment reads the expected
/// items and writes only the closure fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: String,
    /// Human ticket code, e.g. `TK-2024-0012`.
    pub readable_id: String,
    /// Client reference.
    pub client: String,
    /// Lot label printed on the manifest.
    pub title: String,
    #[serde(default)]
    pub expected_items: Vec<ExpectedItem>,
    pub status: WorkOrderStatus,

    // --- closure ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_units: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Collector profile id when the order was closed with a profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    pub created_at: String,
}

impl WorkOrder {
    pub fn is_closed(&self) -> bool {
        self.status == WorkOrderStatus::Closed
    }

    /// Whether `key` names this order, by id or (case-insensitively) by readable id.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.readable_id.eq_ignore_ascii_case(key)
    }
}

/// Intake request from the order system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkOrderRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub readable_id: String,
    pub client: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub expected_items: Vec<ExpectedItem>,
}

// ---------------------------------------------------------------------------
// Boxes
// ---------------------------------------------------------------------------

/// One captured serial number, optionally tagged with the unit's color.
///
/// Accepts either a plain string or `{serial, color}` on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SerialRepr")]
pub struct SerialEntry {
    pub serial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl SerialEntry {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            color: None,
        }
    }

    pub fn with_color(serial: impl Into<String>, color: Option<&str>) -> Self {
        Self {
            serial: serial.into(),
            color: normalize_text(color),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SerialRepr {
    Plain(String),
    Full {
        serial: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl From<SerialRepr> for SerialEntry {
    fn from(repr: SerialRepr) -> Self {
        match repr {
            SerialRepr::Plain(serial) => SerialEntry::new(serial),
            SerialRepr::Full { serial, color } => SerialEntry { serial, color },
        }
    }
}

/// A persisted line inside a box. Its quantity is the number of serials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxItem {
    pub brand: String,
    pub model: String,
    pub product_type: String,
    pub serials: Vec<SerialEntry>,
}

impl BoxItem {
    pub fn quantity(&self) -> u32 {
        self.serials.len() as u32
    }
}

/// A saved, sealed box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedBox {
    pub box_number: u64,
    pub work_order_id: String,
    pub seal: String,
    #[serde(default)]
    pub sku: Option<String>,
    /// Downstream warehouse reception code; carried through, never set here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reception_code: Option<String>,
    pub items: Vec<BoxItem>,
    pub created_at: String,
}

impl PackedBox {
    pub fn units(&self) -> u32 {
        self.items.iter().map(BoxItem::quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Body of `POST /work-orders/{id}/boxes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBoxRequest {
    pub box_number: u64,
    pub seal: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub items: Vec<BoxItem>,
    /// Overwrite an existing box of the same order instead of creating one.
    #[serde(default)]
    pub replace: bool,
}

/// Response of `GET /work-orders/{id}/boxes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxesView {
    pub ticket: WorkOrder,
    pub boxes: Vec<PackedBox>,
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// The per-order collector record (`collector-info`).
///
/// Holds the manual details plus the profile selection and the
/// explicit "unnamed" flag, so a resumed session restores all three.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub unnamed: bool,
}

impl CollectorInfo {
    /// Trim every text field; blank becomes absent.
    pub fn normalized(&self) -> Self {
        Self {
            name: normalize_text(self.name.as_deref()),
            phone: normalize_text(self.phone.as_deref()),
            vehicle_model: normalize_text(self.vehicle_model.as_deref()),
            vehicle_plate: normalize_text(self.vehicle_plate.as_deref()),
            profile_id: normalize_text(self.profile_id.as_deref()),
            unnamed: self.unnamed,
        }
    }

    /// True when any manual detail is filled in.
    pub fn has_manual_details(&self) -> bool {
        [&self.name, &self.phone, &self.vehicle_model, &self.vehicle_plate]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// A reusable collector profile from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorProfile {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_role() -> String {
    "logistics".to_string()
}

fn default_true() -> bool {
    true
}

/// Where the effective collector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectorSource {
    Profile,
    Manual,
    Unnamed,
}

/// The collector actually recorded at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveCollector {
    pub source: CollectorSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
}

impl EffectiveCollector {
    /// The `collector-info` record that restores this collector on reopen.
    ///
    /// A profile is stored by id only, so manual details cannot outrank it.
    pub fn to_record(&self) -> CollectorInfo {
        match self.source {
            CollectorSource::Profile => CollectorInfo {
                profile_id: self.profile_id.clone(),
                ..Default::default()
            },
            CollectorSource::Manual => CollectorInfo {
                name: Some(self.name.clone()),
                phone: self.phone.clone(),
                vehicle_model: self.vehicle_model.clone(),
                vehicle_plate: self.vehicle_plate.clone(),
                profile_id: None,
                unnamed: false,
            }
            .normalized(),
            CollectorSource::Unnamed => CollectorInfo {
                unnamed: true,
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// Body of `POST /work-orders/{id}/@finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub collector: EffectiveCollector,
    pub box_count: u32,
    pub unit_count: u32,
    pub manifest_number: String,
    pub security_seal: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub other_details: Option<String>,
    /// Closing operator; the server default applies when absent.
    #[serde(default)]
    pub closed_by: Option<String>,
}

/// Completion metadata returned by finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub work_order_id: String,
    pub completed_at: String,
    #[serde(default)]
    pub completed_by: Option<String>,
    pub received_units: u32,
}
