use serde::{Deserialize, Serialize};

use logistics_core::{millis_suffix, normalize_text, now_rfc3339, ServiceError};

use crate::model::{EffectiveCollector, PackedBox, WorkOrder};

/// Printed in place of a missing box seal.
pub const MISSING_SEAL: &str = "SIN PRECINTO";

/// Time inputs for generated codes, taken once per generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// Last six digits of the epoch millis.
    pub suffix: String,
    /// RFC 3339 timestamp.
    pub at: String,
}

impl Stamp {
    pub fn now() -> Self {
        Self {
            suffix: millis_suffix(),
            at: now_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload handed to the renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItemRow {
    pub brand: String,
    pub model: String,
    pub product_type: String,
    pub quantity: u32,
    pub serials: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBoxRow {
    pub box_number: u64,
    pub seal: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub units: u32,
    pub items: Vec<ManifestItemRow>,
}

impl ManifestBoxRow {
    fn from_box(b: &PackedBox) -> Self {
        Self {
            box_number: b.box_number,
            seal: normalize_text(Some(&b.seal)).unwrap_or_else(|| MISSING_SEAL.to_string()),
            sku: b.sku.clone(),
            units: b.units(),
            items: b
                .items
                .iter()
                .map(|i| ManifestItemRow {
                    brand: i.brand.clone(),
                    model: i.model.clone(),
                    product_type: i.product_type.clone(),
                    quantity: i.quantity(),
                    serials: i.serials.iter().map(|s| s.serial.clone()).collect(),
                })
                .collect(),
        }
    }
}

/// Everything a renderer needs to print the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPayload {
    pub manifest_number: String,
    pub security_seal: String,
    pub work_order_id: String,
    pub readable_id: String,
    pub client: String,
    pub lot: String,
    #[serde(default)]
    pub collector: Option<EffectiveCollector>,
    pub boxes: Vec<ManifestBoxRow>,
    pub total_boxes: u32,
    pub total_units: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub other_details: Option<String>,
    pub generated_at: String,
}

// ---------------------------------------------------------------------------
// Manifest record
// ---------------------------------------------------------------------------

/// The manifest draft (and, after finalization, the frozen record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub work_order_id: String,
    pub manifest_number: String,
    pub security_seal: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub other_details: Option<String>,
    /// Operator reviewed the number and seal.
    #[serde(default)]
    pub confirmed: bool,
    /// Written by finalize; never cleared.
    #[serde(default)]
    pub frozen: bool,
    pub generated_at: String,
    pub payload: ManifestPayload,
}

impl Manifest {
    /// Number and seal are both present and confirmed.
    pub fn is_ready(&self) -> bool {
        self.confirmed
            && !self.manifest_number.trim().is_empty()
            && !self.security_seal.trim().is_empty()
    }
}

/// Operator edits applied by `confirm`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEdits {
    #[serde(default)]
    pub manifest_number: Option<String>,
    #[serde(default)]
    pub security_seal: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub other_details: Option<String>,
}

/// Build a draft manifest from the non-empty boxes.
///
/// A previous draft keeps its number, seal and notes; only the box listing
/// and collector are refreshed, and the draft needs confirming again.
pub fn generate(
    order: &WorkOrder,
    boxes: &[PackedBox],
    collector: Option<EffectiveCollector>,
    previous: Option<&Manifest>,
    stamp: &Stamp,
) -> Result<Manifest, ServiceError> {
    if order.is_closed() {
        return Err(ServiceError::Precondition(format!(
            "work order {} is closed; its manifest is frozen",
            order.readable_id
        )));
    }

    let mut filled: Vec<&PackedBox> = boxes.iter().filter(|b| !b.is_empty()).collect();
    filled.sort_by_key(|b| b.box_number);
    let Some(first) = filled.first() else {
        return Err(ServiceError::Precondition(
            "no boxes with items to list on the manifest".into(),
        ));
    };

    let manifest_number = previous
        .map(|m| m.manifest_number.clone())
        .unwrap_or_else(|| format!("{}-{}", first.box_number, stamp.suffix));
    let security_seal = previous
        .map(|m| m.security_seal.clone())
        .unwrap_or_else(|| format!("PS-{}-{}", order.readable_id, stamp.suffix));
    let notes = previous.and_then(|m| m.notes.clone());
    let other_details = previous.and_then(|m| m.other_details.clone());

    let rows: Vec<ManifestBoxRow> = filled.iter().map(|b| ManifestBoxRow::from_box(b)).collect();
    let payload = ManifestPayload {
        manifest_number: manifest_number.clone(),
        security_seal: security_seal.clone(),
        work_order_id: order.id.clone(),
        readable_id: order.readable_id.clone(),
        client: order.client.clone(),
        lot: order.title.clone(),
        collector,
        total_boxes: rows.len() as u32,
        total_units: rows.iter().map(|r| r.units).sum(),
        boxes: rows,
        notes: notes.clone(),
        other_details: other_details.clone(),
        generated_at: stamp.at.clone(),
    };

    Ok(Manifest {
        work_order_id: order.id.clone(),
        manifest_number,
        security_seal,
        notes,
        other_details,
        confirmed: false,
        frozen: false,
        generated_at: stamp.at.clone(),
        payload,
    })
}

/// Apply operator edits and mark the draft confirmed.
pub fn confirm(manifest: &mut Manifest, edits: &ManifestEdits) -> Result<(), ServiceError> {
    if manifest.frozen {
        return Err(ServiceError::Precondition("manifest is frozen".into()));
    }

    let number = match &edits.manifest_number {
        Some(n) => normalize_text(Some(n)),
        None => normalize_text(Some(&manifest.manifest_number)),
    };
    let seal = match &edits.security_seal {
        Some(s) => normalize_text(Some(s)),
        None => normalize_text(Some(&manifest.security_seal)),
    };
    let Some(number) = number else {
        return Err(ServiceError::Validation("manifest number is required".into()));
    };
    let Some(seal) = seal else {
        return Err(ServiceError::Validation("security seal is required".into()));
    };

    manifest.manifest_number = number;
    manifest.security_seal = seal;
    if edits.notes.is_some() {
        manifest.notes = normalize_text(edits.notes.as_deref());
    }
    if edits.other_details.is_some() {
        manifest.other_details = normalize_text(edits.other_details.as_deref());
    }
    manifest.confirmed = true;

    manifest.payload.manifest_number = manifest.manifest_number.clone();
    manifest.payload.security_seal = manifest.security_seal.clone();
    manifest.payload.notes = manifest.notes.clone();
    manifest.payload.other_details = manifest.other_details.clone();
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// A rendered, downloadable manifest. The core never inspects `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest {
    pub content_type: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Turns a payload into a printable artifact (PDF, HTML, ...).
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, payload: &ManifestPayload) -> Result<RenderedManifest, ServiceError>;
}

/// Default renderer: the payload as pretty JSON.
pub struct JsonRenderer;

impl ManifestRenderer for JsonRenderer {
    fn render(&self, payload: &ManifestPayload) -> Result<RenderedManifest, ServiceError> {
        let bytes = serde_json::to_vec_pretty(payload)
            .map_err(|e| ServiceError::Internal(format!("render manifest: {e}")))?;
        Ok(RenderedManifest {
            content_type: "application/json".into(),
            file_name: file_name(&payload.manifest_number, &payload.generated_at, "json"),
            bytes,
        })
    }
}

/// `Manifiesto-{number}-{YYYY-MM-DD}.{ext}`, dated by the generation time.
pub fn file_name(number: &str, generated_at: &str, ext: &str) -> String {
    let date = chrono::DateTime::parse_from_rfc3339(generated_at)
        .map(|d| d.date_naive())
        .unwrap_or_else(|_| chrono::Utc::now().date_naive());
    format!("Manifiesto-{}-{}.{}", number, date.format("%Y-%m-%d"), ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoxItem, SerialEntry, WorkOrderStatus};

    fn order() -> WorkOrder {
        WorkOrder {
            id: "wo1".into(),
            readable_id: "TK-2024-0012".into(),
            client: "Acme".into(),
            title: "Lote TK-2024-0012".into(),
            expected_items: vec![],
            status: WorkOrderStatus::Open,
            completed_at: None,
            completed_by: None,
            received_units: None,
            notes: None,
            assigned_to: None,
            created_at: "2024-03-01T10:00:00Z".into(),
        }
    }

    fn packed(number: u64, seal: &str, serials: &[&str]) -> PackedBox {
        PackedBox {
            box_number: number,
            work_order_id: "wo1".into(),
            seal: seal.into(),
            sku: None,
            reception_code: None,
            items: if serials.is_empty() {
                vec![]
            } else {
                vec![BoxItem {
                    brand: "Dell".into(),
                    model: "OptiPlex".into(),
                    product_type: "Desktop".into(),
                    serials: serials.iter().map(|s| SerialEntry::new(*s)).collect(),
                }]
            },
            created_at: "2024-03-01T10:00:00Z".into(),
        }
    }

    fn stamp() -> Stamp {
        Stamp {
            suffix: "512934".into(),
            at: "2024-03-05T18:30:00Z".into(),
        }
    }

    #[test]
    fn empty_boxes_rejected() {
        let err = generate(&order(), &[packed(10001, "S", &[])], None, None, &stamp()).unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(_)));
    }

    #[test]
    fn default_codes_and_totals() {
        let boxes = [
            packed(10005, "", &["C"]),
            packed(10004, "SEC-4", &["A", "B"]),
            packed(10006, "SEC-6", &[]),
        ];
        let m = generate(&order(), &boxes, None, None, &stamp()).unwrap();
        assert_eq!(m.manifest_number, "10004-512934");
        assert_eq!(m.security_seal, "PS-TK-2024-0012-512934");
        assert!(!m.confirmed);
        assert_eq!(m.payload.total_boxes, 2);
        assert_eq!(m.payload.total_units, 3);
        assert_eq!(m.payload.boxes[0].box_number, 10004);
        assert_eq!(m.payload.boxes[1].seal, MISSING_SEAL);
        assert_eq!(m.payload.lot, "Lote TK-2024-0012");
    }

    #[test]
    fn regenerate_keeps_operator_edits() {
        let boxes = [packed(10004, "SEC-4", &["A"])];
        let mut first = generate(&order(), &boxes, None, None, &stamp()).unwrap();
        confirm(
            &mut first,
            &ManifestEdits {
                manifest_number: Some(" M-77 ".into()),
                notes: Some("fragile".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(first.is_ready());

        let more = [packed(10004, "SEC-4", &["A"]), packed(10005, "SEC-5", &["B"])];
        let second = generate(&order(), &more, None, Some(&first), &stamp()).unwrap();
        assert_eq!(second.manifest_number, "M-77");
        assert_eq!(second.notes.as_deref(), Some("fragile"));
        assert_eq!(second.payload.total_boxes, 2);
        assert!(!second.is_ready());
    }

    #[test]
    fn confirm_requires_number_and_seal() {
        let mut m = generate(&order(), &[packed(10004, "S", &["A"])], None, None, &stamp()).unwrap();
        let blank = ManifestEdits {
            security_seal: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(confirm(&mut m, &blank), Err(ServiceError::Validation(_))));
        assert!(!m.confirmed);

        m.frozen = true;
        assert!(matches!(confirm(&mut m, &ManifestEdits::default()), Err(ServiceError::Precondition(_))));
    }

    #[test]
    fn closed_order_cannot_regenerate() {
        let mut o = order();
        o.status = WorkOrderStatus::Closed;
        let err = generate(&o, &[packed(10004, "S", &["A"])], None, None, &stamp()).unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(_)));
    }

    #[test]
    fn json_renderer_names_file() {
        let m = generate(&order(), &[packed(10004, "S", &["A"])], None, None, &stamp()).unwrap();
        let out = JsonRenderer.render(&m.payload).unwrap();
        assert_eq!(out.file_name, "Manifiesto-10004-512934-2024-03-05.json");
        assert_eq!(out.content_type, "application/json");
        let back: ManifestPayload = serde_json::from_slice(&out.bytes).unwrap();
        assert_eq!(back, m.payload);
    }
}
