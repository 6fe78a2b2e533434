use logistics_core::ServiceError;

use crate::builder::{BoxBuilder, BuildMode, LineItemChanges};
use crate::catalog::Catalog;
use crate::collector::{Collector, CollectorAssignment};
use crate::finalize::{FinalizationState, FinalizeBlocker, FinalizeCheck};
use crate::manifest::{self, Manifest, ManifestEdits, ManifestPayload, Stamp};
use crate::model::{
    Completion, CollectorInfo, CollectorProfile, FinalizeRequest, PackedBox, SaveBoxRequest,
    WorkOrder, WorkOrderStatus,
};
use crate::serial::SerialCaptureSession;

// ---------------------------------------------------------------------------
// Stage / Event / Effect
// ---------------------------------------------------------------------------

/// The step the operator is on.
///
/// ```text
/// ASSIGNING_COLLECTOR → BUILDING_BOX ⇄ CAPTURING_SERIALS
///                            ↓
///                   GENERATING_MANIFEST → FINALIZING → CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AssigningCollector,
    BuildingBox,
    CapturingSerials,
    GeneratingManifest,
    Finalizing,
    Closed,
}

/// Operator actions and backend results fed into the session.
#[derive(Debug, Clone)]
pub enum Event {
    // --- collector ---
    AssignProfile(CollectorProfile),
    AssignManual(CollectorInfo),
    MarkUnnamed,
    ClearCollector,
    ConfirmCollector,
    CollectorSaved,
    CollectorSaveFailed,

    // --- box ---
    NextNumber(u64),
    StartBox,
    EditBox(u64),
    DiscardBox,
    RenumberBox,
    SetSeal(String),
    SetSku(String),
    RemoveLineItem(u32),
    EditLineItem(u32, LineItemChanges),

    // --- serial capture ---
    StartCapture {
        brand: String,
        model: String,
        product_type: String,
        quantity: u32,
    },
    RecaptureLine(u32),
    SetDraft(String),
    CommitDraft { color: Option<String> },
    AddSerial { serial: String, color: Option<String> },
    RemoveSerial(usize),
    FinishCapture,
    CancelCapture,

    // --- persistence results ---
    SaveBox,
    BoxSaved(PackedBox),
    BoxSaveFailed(ServiceError),
    DeleteBox(u64),
    BoxDeleted(u64),
    BoxDeleteFailed(u64),

    // --- manifest ---
    GenerateManifest(Stamp),
    ConfirmManifest(ManifestEdits),
    ManifestSaved,
    ManifestSaveFailed,
    RenderManifest,

    // --- closure ---
    Finalize { closed_by: Option<String> },
    Finalized(Completion),
    FinalizeFailed,
    Reopen,
    Reopened(WorkOrder),
}

/// Side effects the controller must run after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchNextBoxNumber,
    SaveBox(SaveBoxRequest),
    DeleteBox(u64),
    SaveCollector(CollectorInfo),
    SaveManifest(Manifest),
    Finalize(FinalizeRequest),
    Reopen,
    Render(ManifestPayload),
}

/// Everything loaded from the backend when a session opens.
#[derive(Debug, Clone)]
pub struct SessionSeed {
    pub order: WorkOrder,
    pub boxes: Vec<PackedBox>,
    pub collector: Option<CollectorInfo>,
    pub directory: Vec<CollectorProfile>,
    pub manifest: Option<Manifest>,
    pub catalog: Catalog,
    pub unnamed_label: String,
}

// ---------------------------------------------------------------------------
// FulfillmentSession
// ---------------------------------------------------------------------------

/// Fulfillment state for one work order.
///
/// Pure: `apply` validates an event, updates the state and returns the
/// effects to run. It never performs I/O. A rejected event leaves the
/// state untouched.
#[derive(Debug, Clone)]
pub struct FulfillmentSession {
    order: WorkOrder,
    stage: Stage,
    /// Where to go back to when finalize fails or the order is reopened.
    resume_stage: Stage,
    boxes: Vec<PackedBox>,
    builder: Option<BoxBuilder>,
    capture: Option<SerialCaptureSession>,
    collector: CollectorAssignment,
    directory: Vec<CollectorProfile>,
    manifest: Option<Manifest>,
    next_number: Option<u64>,
    catalog: Catalog,
    unnamed_label: String,
    saving: bool,
    /// Boxes removed locally whose remote delete has not answered yet.
    pending_deletes: Vec<(usize, PackedBox)>,
    /// Stage to return to if the collector record fails to save.
    collector_rollback: Option<Stage>,
    /// Stage and manifest to return to if a manifest save fails.
    manifest_rollback: Option<(Stage, Option<Manifest>)>,
}

fn no_box() -> ServiceError {
    ServiceError::Precondition("no box is open".into())
}

fn no_capture() -> ServiceError {
    ServiceError::Precondition("no serial capture in progress".into())
}

impl FulfillmentSession {
    pub fn new(seed: SessionSeed) -> Self {
        let collector = seed
            .collector
            .as_ref()
            .map(|record| CollectorAssignment::restore(record, &seed.directory))
            .unwrap_or_default();
        let working = if collector.effective().is_some() {
            Stage::BuildingBox
        } else {
            Stage::AssigningCollector
        };
        let mut boxes = seed.boxes;
        boxes.sort_by_key(|b| b.box_number);
        let mut manifest = seed.manifest;
        if !seed.order.is_closed() {
            // A frozen record on an open order belongs to an earlier closure.
            if let Some(m) = manifest.as_mut().filter(|m| m.frozen) {
                m.frozen = false;
                m.confirmed = false;
            }
        }

        Self {
            stage: if seed.order.is_closed() { Stage::Closed } else { working },
            resume_stage: working,
            order: seed.order,
            boxes,
            builder: None,
            capture: None,
            collector,
            directory: seed.directory,
            manifest,
            next_number: None,
            catalog: seed.catalog,
            unnamed_label: seed.unnamed_label,
            saving: false,
            pending_deletes: Vec::new(),
            collector_rollback: None,
            manifest_rollback: None,
        }
    }

    /// Effects to run right after opening.
    pub fn open_effects(&self) -> Vec<Effect> {
        if self.order.is_closed() {
            Vec::new()
        } else {
            vec![Effect::FetchNextBoxNumber]
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn order(&self) -> &WorkOrder {
        &self.order
    }

    pub fn boxes(&self) -> &[PackedBox] {
        &self.boxes
    }

    pub fn builder(&self) -> Option<&BoxBuilder> {
        self.builder.as_ref()
    }

    pub fn capture(&self) -> Option<&SerialCaptureSession> {
        self.capture.as_ref()
    }

    pub fn collector(&self) -> Option<Collector> {
        self.collector.effective()
    }

    pub fn directory(&self) -> &[CollectorProfile] {
        &self.directory
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn next_number(&self) -> Option<u64> {
        self.next_number
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn finalization_state(&self) -> FinalizationState {
        let collector = self.collector.effective();
        self.finalize_check(collector.as_ref()).state()
    }

    /// First reason finalize would be refused right now.
    pub fn finalize_blocker(&self) -> Option<FinalizeBlocker> {
        let collector = self.collector.effective();
        self.finalize_check(collector.as_ref()).blocker()
    }

    fn finalize_check<'a>(&'a self, collector: Option<&'a Collector>) -> FinalizeCheck<'a> {
        FinalizeCheck {
            order: &self.order,
            boxes: &self.boxes,
            collector,
            manifest: self.manifest.as_ref(),
            builder_has_items: self.capture.is_some()
                || self.builder.as_ref().is_some_and(BoxBuilder::has_items),
        }
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn ensure_editable(&self) -> Result<(), ServiceError> {
        match self.stage {
            Stage::Closed => Err(ServiceError::Precondition(format!(
                "work order {} is closed",
                self.order.readable_id
            ))),
            Stage::Finalizing => Err(ServiceError::Precondition("finalize is in progress".into())),
            _ => Ok(()),
        }
    }

    fn ensure_not_capturing(&self) -> Result<(), ServiceError> {
        self.ensure_editable()?;
        if self.capture.is_some() {
            return Err(ServiceError::Precondition(
                "finish or cancel the serial capture first".into(),
            ));
        }
        Ok(())
    }

    fn ensure_no_unsaved_box(&self) -> Result<(), ServiceError> {
        if self.builder.as_ref().is_some_and(BoxBuilder::has_items) {
            return Err(FinalizeBlocker::UnsavedBox.into());
        }
        Ok(())
    }

    fn builder_mut(&mut self) -> Result<&mut BoxBuilder, ServiceError> {
        self.builder.as_mut().ok_or_else(no_box)
    }

    fn capture_mut(&mut self) -> Result<&mut SerialCaptureSession, ServiceError> {
        self.capture.as_mut().ok_or_else(no_capture)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub fn apply(&mut self, event: Event) -> Result<Vec<Effect>, ServiceError> {
        match event {
            // --- collector ---
            Event::AssignProfile(profile) => {
                self.ensure_not_capturing()?;
                self.collector.assign_profile(profile);
                self.stage = Stage::AssigningCollector;
                Ok(vec![])
            }
            Event::AssignManual(details) => {
                self.ensure_not_capturing()?;
                self.collector.assign_manual(&details);
                self.stage = Stage::AssigningCollector;
                Ok(vec![])
            }
            Event::MarkUnnamed => {
                self.ensure_not_capturing()?;
                self.collector.mark_unnamed();
                self.stage = Stage::AssigningCollector;
                Ok(vec![])
            }
            Event::ClearCollector => {
                self.ensure_not_capturing()?;
                self.collector.clear();
                self.stage = Stage::AssigningCollector;
                Ok(vec![])
            }
            Event::ConfirmCollector => {
                self.ensure_not_capturing()?;
                if self.collector.effective().is_none() {
                    return Err(FinalizeBlocker::NoCollector.into());
                }
                self.collector_rollback = Some(self.stage);
                self.stage = Stage::BuildingBox;
                Ok(vec![Effect::SaveCollector(self.collector.to_record())])
            }
            Event::CollectorSaved => {
                self.collector_rollback = None;
                Ok(vec![])
            }
            Event::CollectorSaveFailed => {
                if let Some(stage) = self.collector_rollback.take() {
                    self.stage = stage;
                }
                Ok(vec![])
            }

            // --- box ---
            Event::NextNumber(n) => {
                self.next_number = Some(n);
                Ok(vec![])
            }
            Event::StartBox => {
                self.ensure_not_capturing()?;
                self.ensure_no_unsaved_box()?;
                let n = self.next_number.ok_or_else(|| {
                    ServiceError::Precondition("next box number not loaded yet".into())
                })?;
                self.builder = Some(BoxBuilder::start(n));
                self.stage = Stage::BuildingBox;
                Ok(vec![])
            }
            Event::EditBox(number) => {
                self.ensure_not_capturing()?;
                self.ensure_no_unsaved_box()?;
                let saved = self
                    .boxes
                    .iter()
                    .find(|b| b.box_number == number)
                    .ok_or_else(|| ServiceError::NotFound(format!("box {number}")))?;
                self.builder = Some(BoxBuilder::from_saved(saved));
                self.stage = Stage::BuildingBox;
                Ok(vec![])
            }
            Event::DiscardBox => {
                self.ensure_editable()?;
                if self.saving {
                    return Err(ServiceError::Precondition("box save is in flight".into()));
                }
                self.capture = None;
                self.builder = None;
                self.stage = Stage::BuildingBox;
                Ok(vec![])
            }
            Event::RenumberBox => {
                self.ensure_not_capturing()?;
                let n = self.next_number.ok_or_else(|| {
                    ServiceError::Precondition("next box number not loaded yet".into())
                })?;
                self.builder_mut()?.renumber(n)?;
                Ok(vec![])
            }
            Event::SetSeal(value) => {
                self.ensure_editable()?;
                self.builder_mut()?.set_seal(&value);
                Ok(vec![])
            }
            Event::SetSku(value) => {
                self.ensure_editable()?;
                self.builder_mut()?.set_sku(&value);
                Ok(vec![])
            }
            Event::RemoveLineItem(id) => {
                self.ensure_not_capturing()?;
                self.builder_mut()?.remove_line_item(id)?;
                Ok(vec![])
            }
            Event::EditLineItem(id, changes) => {
                self.ensure_not_capturing()?;
                let builder = self.builder.as_mut().ok_or_else(no_box)?;
                builder.edit_line_item(id, changes, &self.catalog)?;
                Ok(vec![])
            }

            // --- serial capture ---
            Event::StartCapture {
                brand,
                model,
                product_type,
                quantity,
            } => {
                self.ensure_not_capturing()?;
                if self.builder.is_none() {
                    return Err(no_box());
                }
                self.catalog.validate(&brand, &model, &product_type)?;
                let session = SerialCaptureSession::start(&brand, &model, &product_type, quantity)?;
                self.capture = Some(session);
                self.stage = Stage::CapturingSerials;
                Ok(vec![])
            }
            Event::RecaptureLine(id) => {
                self.ensure_not_capturing()?;
                let line = self.builder.as_ref().ok_or_else(no_box)?.item(id)?;
                let session = SerialCaptureSession::resume(
                    id,
                    &line.brand,
                    &line.model,
                    &line.product_type,
                    line.quantity,
                    line.serials.clone(),
                )?;
                self.capture = Some(session);
                self.stage = Stage::CapturingSerials;
                Ok(vec![])
            }
            Event::SetDraft(text) => {
                self.capture_mut()?.set_draft(&text);
                Ok(vec![])
            }
            Event::CommitDraft { color } => {
                self.capture_mut()?.commit_draft(color.as_deref())?;
                self.finish_if_complete()
            }
            Event::AddSerial { serial, color } => {
                self.capture_mut()?.add_serial(&serial, color.as_deref())?;
                self.finish_if_complete()
            }
            Event::RemoveSerial(index) => {
                self.capture_mut()?.remove_serial(index)?;
                Ok(vec![])
            }
            Event::FinishCapture => self.finish_capture(),
            Event::CancelCapture => {
                if self.capture.take().is_none() {
                    return Err(no_capture());
                }
                self.stage = Stage::BuildingBox;
                Ok(vec![])
            }

            // --- persistence ---
            Event::SaveBox => {
                self.ensure_not_capturing()?;
                if self.saving {
                    return Err(ServiceError::Precondition("box save is in flight".into()));
                }
                let req = self.builder.as_ref().ok_or_else(no_box)?.to_request()?;
                self.saving = true;
                Ok(vec![Effect::SaveBox(req)])
            }
            Event::BoxSaved(saved) => {
                self.saving = false;
                match self.boxes.iter_mut().find(|b| b.box_number == saved.box_number) {
                    Some(existing) => *existing = saved,
                    None => {
                        self.boxes.push(saved);
                        self.boxes.sort_by_key(|b| b.box_number);
                    }
                }
                self.builder = None;
                self.next_number = None;
                self.unconfirm_manifest();
                if self.stage != Stage::Closed {
                    self.stage = Stage::BuildingBox;
                }
                Ok(vec![Effect::FetchNextBoxNumber])
            }
            Event::BoxSaveFailed(err) => {
                self.saving = false;
                // The box stays in the builder; a collision needs a fresh number.
                if matches!(err, ServiceError::Conflict(_)) {
                    self.next_number = None;
                    return Ok(vec![Effect::FetchNextBoxNumber]);
                }
                Ok(vec![])
            }
            Event::DeleteBox(number) => {
                self.ensure_not_capturing()?;
                let pos = self
                    .boxes
                    .iter()
                    .position(|b| b.box_number == number)
                    .ok_or_else(|| ServiceError::NotFound(format!("box {number}")))?;
                let editing_it = self
                    .builder
                    .as_ref()
                    .is_some_and(|b| b.mode() == BuildMode::Replace && b.number() == number);
                if editing_it {
                    self.builder = None;
                }
                let removed = self.boxes.remove(pos);
                self.pending_deletes.push((pos, removed));
                Ok(vec![Effect::DeleteBox(number)])
            }
            Event::BoxDeleted(number) => {
                self.pending_deletes.retain(|(_, b)| b.box_number != number);
                self.unconfirm_manifest();
                Ok(vec![])
            }
            Event::BoxDeleteFailed(number) => {
                if let Some(i) = self.pending_deletes.iter().position(|(_, b)| b.box_number == number) {
                    let (pos, restored) = self.pending_deletes.remove(i);
                    let pos = pos.min(self.boxes.len());
                    self.boxes.insert(pos, restored);
                }
                Ok(vec![])
            }

            // --- manifest ---
            Event::GenerateManifest(stamp) => {
                self.ensure_not_capturing()?;
                let collector = self
                    .collector
                    .effective()
                    .map(|c| c.resolve(&self.unnamed_label));
                let draft = manifest::generate(
                    &self.order,
                    &self.boxes,
                    collector,
                    self.manifest.as_ref(),
                    &stamp,
                )?;
                self.manifest_rollback = Some((self.stage, self.manifest.take()));
                self.manifest = Some(draft.clone());
                self.stage = Stage::GeneratingManifest;
                Ok(vec![Effect::SaveManifest(draft)])
            }
            Event::ConfirmManifest(edits) => {
                self.ensure_editable()?;
                let mut draft = self.manifest.clone().ok_or_else(|| {
                    ServiceError::Precondition("generate the manifest first".into())
                })?;
                manifest::confirm(&mut draft, &edits)?;
                self.manifest_rollback = Some((self.stage, self.manifest.replace(draft.clone())));
                Ok(vec![Effect::SaveManifest(draft)])
            }
            Event::ManifestSaved => {
                self.manifest_rollback = None;
                Ok(vec![])
            }
            Event::ManifestSaveFailed => {
                if let Some((stage, previous)) = self.manifest_rollback.take() {
                    self.stage = stage;
                    self.manifest = previous;
                }
                Ok(vec![])
            }
            Event::RenderManifest => {
                let m = self.manifest.as_ref().ok_or_else(|| {
                    ServiceError::Precondition("generate the manifest first".into())
                })?;
                Ok(vec![Effect::Render(m.payload.clone())])
            }

            // --- closure ---
            Event::Finalize { closed_by } => {
                if self.stage == Stage::Finalizing {
                    return Err(ServiceError::Precondition("finalize is in progress".into()));
                }
                let collector = self.collector.effective();
                let req = self
                    .finalize_check(collector.as_ref())
                    .request(&self.unnamed_label, closed_by)?;
                self.resume_stage = self.stage;
                self.stage = Stage::Finalizing;
                Ok(vec![Effect::Finalize(req)])
            }
            Event::Finalized(done) => {
                self.order.status = WorkOrderStatus::Closed;
                self.order.completed_at = Some(done.completed_at);
                self.order.completed_by = done.completed_by;
                self.order.received_units = Some(done.received_units);
                if let Some(m) = self.manifest.as_mut() {
                    m.frozen = true;
                }
                self.builder = None;
                self.capture = None;
                self.stage = Stage::Closed;
                Ok(vec![])
            }
            Event::FinalizeFailed => {
                if self.stage == Stage::Finalizing {
                    self.stage = self.resume_stage;
                }
                Ok(vec![])
            }
            Event::Reopen => {
                if !self.order.is_closed() {
                    return Err(ServiceError::Precondition(format!(
                        "work order {} is not closed",
                        self.order.readable_id
                    )));
                }
                Ok(vec![Effect::Reopen])
            }
            Event::Reopened(order) => {
                self.order = order;
                self.stage = self.resume_stage;
                // The closed manifest stays on record; a new closure needs a fresh draft.
                if let Some(m) = self.manifest.as_mut() {
                    m.frozen = false;
                    m.confirmed = false;
                }
                Ok(vec![Effect::FetchNextBoxNumber])
            }
        }
    }

    /// The box listing changed, so the draft must be regenerated and confirmed.
    fn unconfirm_manifest(&mut self) {
        if let Some(m) = self.manifest.as_mut().filter(|m| !m.frozen) {
            m.confirmed = false;
        }
    }

    fn finish_if_complete(&mut self) -> Result<Vec<Effect>, ServiceError> {
        if self.capture.as_ref().is_some_and(SerialCaptureSession::is_complete) {
            return self.finish_capture();
        }
        Ok(vec![])
    }

    fn finish_capture(&mut self) -> Result<Vec<Effect>, ServiceError> {
        let session = self.capture.clone().ok_or_else(no_capture)?;
        let builder = self.builder.as_mut().ok_or_else(no_box)?;
        let recapture = session.recapture_of();
        let item = session.finalize(&self.catalog)?;
        match recapture {
            Some(id) => builder.replace_line_item(id, item, &self.catalog)?,
            None => {
                builder.add_line_item(item, &self.catalog)?;
            }
        }
        self.capture = None;
        self.stage = Stage::BuildingBox;
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::model::{BoxItem, SerialEntry};

    fn order() -> WorkOrder {
        WorkOrder {
            id: "wo1".into(),
            readable_id: "TK-1".into(),
            client: "Acme".into(),
            title: "Lote TK-1".into(),
            expected_items: vec![],
            status: WorkOrderStatus::Open,
            completed_at: None,
            completed_by: None,
            received_units: None,
            notes: None,
            assigned_to: None,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn seed() -> SessionSeed {
        SessionSeed {
            order: order(),
            boxes: vec![],
            collector: None,
            directory: vec![],
            manifest: None,
            catalog: sample_catalog(),
            unnamed_label: "Recolector sin nombre".into(),
        }
    }

    fn stamp() -> Stamp {
        Stamp {
            suffix: "000042".into(),
            at: "2024-01-02T00:00:00Z".into(),
        }
    }

    fn saved_box(number: u64, serials: &[&str]) -> PackedBox {
        PackedBox {
            box_number: number,
            work_order_id: "wo1".into(),
            seal: format!("SEC-{number}"),
            sku: None,
            reception_code: None,
            items: vec![BoxItem {
                brand: "Dell".into(),
                model: "OptiPlex".into(),
                product_type: "Desktop".into(),
                serials: serials.iter().map(|s| SerialEntry::new(*s)).collect(),
            }],
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn capture(s: &mut FulfillmentSession, qty: u32) {
        s.apply(Event::StartCapture {
            brand: "Dell".into(),
            model: "OptiPlex".into(),
            product_type: "Desktop".into(),
            quantity: qty,
        })
        .unwrap();
    }

    fn add(s: &mut FulfillmentSession, serial: &str) -> Result<Vec<Effect>, ServiceError> {
        s.apply(Event::AddSerial {
            serial: serial.into(),
            color: None,
        })
    }

    /// Session with a box open at 10001 holding one complete line (SN1, SN2).
    fn with_full_box() -> FulfillmentSession {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::NextNumber(10001)).unwrap();
        s.apply(Event::StartBox).unwrap();
        s.apply(Event::SetSeal("SEC-1001".into())).unwrap();
        capture(&mut s, 2);
        add(&mut s, "SN1").unwrap();
        add(&mut s, "SN2").unwrap();
        s
    }

    #[test]
    fn opens_in_collector_stage_and_fetches_number() {
        let s = FulfillmentSession::new(seed());
        assert_eq!(s.stage(), Stage::AssigningCollector);
        assert_eq!(s.open_effects(), vec![Effect::FetchNextBoxNumber]);
    }

    #[test]
    fn resumed_collector_skips_to_boxes() {
        let mut sd = seed();
        sd.collector = Some(CollectorInfo {
            name: Some("Luis".into()),
            ..Default::default()
        });
        let s = FulfillmentSession::new(sd);
        assert_eq!(s.stage(), Stage::BuildingBox);
        assert!(matches!(s.collector(), Some(Collector::Manual(_))));
    }

    #[test]
    fn closed_order_opens_closed_and_rejects_edits() {
        let mut sd = seed();
        sd.order.status = WorkOrderStatus::Closed;
        sd.boxes = vec![saved_box(10001, &["A"])];
        let mut s = FulfillmentSession::new(sd);
        assert_eq!(s.stage(), Stage::Closed);
        assert!(s.open_effects().is_empty());

        assert!(matches!(s.apply(Event::MarkUnnamed), Err(ServiceError::Precondition(_))));
        assert!(matches!(s.apply(Event::DeleteBox(10001)), Err(ServiceError::Precondition(_))));
        assert_eq!(s.boxes().len(), 1);
    }

    #[test]
    fn confirm_collector_persists_record() {
        let mut s = FulfillmentSession::new(seed());
        assert!(matches!(s.apply(Event::ConfirmCollector), Err(ServiceError::Precondition(_))));

        s.apply(Event::MarkUnnamed).unwrap();
        let effects = s.apply(Event::ConfirmCollector).unwrap();
        assert_eq!(s.stage(), Stage::BuildingBox);
        match &effects[..] {
            [Effect::SaveCollector(record)] => assert!(record.unnamed),
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn start_box_needs_a_number() {
        let mut s = FulfillmentSession::new(seed());
        assert!(matches!(s.apply(Event::StartBox), Err(ServiceError::Precondition(_))));
        s.apply(Event::NextNumber(10001)).unwrap();
        s.apply(Event::StartBox).unwrap();
        assert_eq!(s.builder().unwrap().number(), 10001);
    }

    #[test]
    fn capture_auto_finalizes_into_builder() {
        let s = with_full_box();
        assert!(s.capture().is_none());
        assert_eq!(s.stage(), Stage::BuildingBox);
        let line = &s.builder().unwrap().items()[0];
        assert_eq!(line.quantity, 2);
        assert_eq!(line.serials[1].serial, "SN2");
    }

    #[test]
    fn duplicate_serial_keeps_count() {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::NextNumber(10001)).unwrap();
        s.apply(Event::StartBox).unwrap();
        capture(&mut s, 2);
        add(&mut s, "SN1").unwrap();
        assert!(matches!(add(&mut s, "SN1"), Err(ServiceError::Validation(_))));
        assert_eq!(s.capture().unwrap().captured().len(), 1);
        assert_eq!(s.stage(), Stage::CapturingSerials);
    }

    #[test]
    fn capture_requires_known_references_and_open_box() {
        let mut s = FulfillmentSession::new(seed());
        let start = Event::StartCapture {
            brand: "Dell".into(),
            model: "OptiPlex".into(),
            product_type: "Desktop".into(),
            quantity: 1,
        };
        assert!(matches!(s.apply(start.clone()), Err(ServiceError::Precondition(_))));

        s.apply(Event::NextNumber(10001)).unwrap();
        s.apply(Event::StartBox).unwrap();
        let bad = Event::StartCapture {
            brand: "Acer".into(),
            model: "OptiPlex".into(),
            product_type: "Desktop".into(),
            quantity: 1,
        };
        assert!(matches!(s.apply(bad), Err(ServiceError::Validation(_))));
        assert!(s.capture().is_none());

        s.apply(start).unwrap();
        s.apply(Event::CancelCapture).unwrap();
        assert!(!s.builder().unwrap().has_items());
    }

    #[test]
    fn save_emits_request_then_fetches_next_number() {
        let mut s = with_full_box();
        let effects = s.apply(Event::SaveBox).unwrap();
        let [Effect::SaveBox(req)] = &effects[..] else {
            panic!("unexpected effects {effects:?}");
        };
        assert_eq!(req.seal, "SEC-1001");
        assert_eq!(req.items[0].quantity(), 2);

        // No second save while one is in flight.
        assert!(matches!(s.apply(Event::SaveBox), Err(ServiceError::Precondition(_))));

        let after = s.apply(Event::BoxSaved(saved_box(10001, &["SN1", "SN2"]))).unwrap();
        assert_eq!(after, vec![Effect::FetchNextBoxNumber]);
        assert!(s.builder().is_none());
        assert_eq!(s.next_number(), None);
        assert_eq!(s.boxes().len(), 1);
    }

    #[test]
    fn failed_save_keeps_box_and_conflict_refetches() {
        let mut s = with_full_box();
        s.apply(Event::SaveBox).unwrap();
        let effects = s
            .apply(Event::BoxSaveFailed(ServiceError::Storage("down".into())))
            .unwrap();
        assert!(effects.is_empty());
        assert!(s.builder().unwrap().has_items());

        s.apply(Event::SaveBox).unwrap();
        let effects = s
            .apply(Event::BoxSaveFailed(ServiceError::Conflict("taken".into())))
            .unwrap();
        assert_eq!(effects, vec![Effect::FetchNextBoxNumber]);
        // The box is not renumbered until the operator asks.
        assert_eq!(s.builder().unwrap().number(), 10001);
        s.apply(Event::NextNumber(10002)).unwrap();
        s.apply(Event::RenumberBox).unwrap();
        assert_eq!(s.builder().unwrap().number(), 10002);
    }

    #[test]
    fn delete_rolls_back_on_failure() {
        let mut sd = seed();
        sd.boxes = vec![saved_box(10002, &["B"]), saved_box(10001, &["A"])];
        let mut s = FulfillmentSession::new(sd);

        let effects = s.apply(Event::DeleteBox(10001)).unwrap();
        assert_eq!(effects, vec![Effect::DeleteBox(10001)]);
        assert_eq!(s.boxes().len(), 1);

        s.apply(Event::BoxDeleteFailed(10001)).unwrap();
        let numbers: Vec<_> = s.boxes().iter().map(|b| b.box_number).collect();
        assert_eq!(numbers, vec![10001, 10002]);

        s.apply(Event::DeleteBox(10002)).unwrap();
        s.apply(Event::BoxDeleted(10002)).unwrap();
        s.apply(Event::BoxDeleteFailed(10002)).unwrap();
        assert_eq!(s.boxes().len(), 1);
    }

    #[test]
    fn finalize_gates_in_order() {
        let mut s = FulfillmentSession::new(seed());
        let err = s.apply(Event::Finalize { closed_by: None }).unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(ref m) if m.starts_with("no boxes")));
        assert_eq!(s.order().status, WorkOrderStatus::Open);

        s.apply(Event::BoxSaved(saved_box(10001, &["A"]))).unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoCollector));

        s.apply(Event::MarkUnnamed).unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));

        s.apply(Event::GenerateManifest(stamp())).unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();

        s.apply(Event::NextNumber(10002)).unwrap();
        s.apply(Event::StartBox).unwrap();
        capture(&mut s, 1);
        add(&mut s, "B").unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::UnsavedBox));

        s.apply(Event::DiscardBox).unwrap();
        assert_eq!(s.finalization_state(), FinalizationState::ReadyToFinalize);

        let effects = s.apply(Event::Finalize { closed_by: Some("ops".into()) }).unwrap();
        let [Effect::Finalize(req)] = &effects[..] else {
            panic!("unexpected effects {effects:?}");
        };
        assert_eq!(req.unit_count, 1);
        assert_eq!(req.manifest_number, "10001-000042");
        assert_eq!(s.stage(), Stage::Finalizing);
    }

    #[test]
    fn finalize_failure_restores_stage_and_reopen_round_trip() {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::BoxSaved(saved_box(10001, &["A"]))).unwrap();
        s.apply(Event::MarkUnnamed).unwrap();
        s.apply(Event::GenerateManifest(stamp())).unwrap();
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();

        s.apply(Event::Finalize { closed_by: None }).unwrap();
        s.apply(Event::FinalizeFailed).unwrap();
        assert_eq!(s.stage(), Stage::GeneratingManifest);
        assert_eq!(s.order().status, WorkOrderStatus::Open);

        s.apply(Event::Finalize { closed_by: None }).unwrap();
        s.apply(Event::Finalized(Completion {
            work_order_id: "wo1".into(),
            completed_at: "2024-01-03T00:00:00Z".into(),
            completed_by: Some("ops".into()),
            received_units: 1,
        }))
        .unwrap();
        assert_eq!(s.stage(), Stage::Closed);
        assert!(s.manifest().unwrap().frozen);

        let again = s.apply(Event::Finalize { closed_by: None }).unwrap_err();
        assert!(matches!(again, ServiceError::Precondition(ref m) if m.contains("already closed")));

        let boxes_before = s.boxes().to_vec();
        let manifest_before = s.manifest().cloned();
        assert_eq!(s.apply(Event::Reopen).unwrap(), vec![Effect::Reopen]);
        let mut reopened = s.order().clone();
        reopened.status = WorkOrderStatus::Open;
        reopened.completed_at = None;
        reopened.completed_by = None;
        s.apply(Event::Reopened(reopened)).unwrap();

        assert_eq!(s.order().status, WorkOrderStatus::Open);
        assert_eq!(s.stage(), Stage::GeneratingManifest);
        assert_eq!(s.boxes(), &boxes_before[..]);
        assert!(matches!(s.apply(Event::Reopen), Err(ServiceError::Precondition(_))));

        // Same manifest, but open again and awaiting a fresh confirmation.
        let m = s.manifest().unwrap();
        let before = manifest_before.unwrap();
        assert_eq!(m.manifest_number, before.manifest_number);
        assert_eq!(m.payload, before.payload);
        assert!(!m.frozen);
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();
        assert_eq!(s.finalize_blocker(), None);
    }

    #[test]
    fn box_changes_require_manifest_confirmation_again() {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::BoxSaved(saved_box(10001, &["A"]))).unwrap();
        s.apply(Event::MarkUnnamed).unwrap();
        s.apply(Event::GenerateManifest(stamp())).unwrap();
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();
        assert_eq!(s.finalize_blocker(), None);

        s.apply(Event::BoxSaved(saved_box(10002, &["B", "C"]))).unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
        assert!(matches!(
            s.apply(Event::Finalize { closed_by: None }),
            Err(ServiceError::Precondition(_))
        ));

        s.apply(Event::GenerateManifest(stamp())).unwrap();
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();
        let payload = &s.manifest().unwrap().payload;
        assert_eq!(payload.total_boxes, 2);
        assert_eq!(payload.total_units, 3);
        let effects = s.apply(Event::Finalize { closed_by: None }).unwrap();
        let [Effect::Finalize(req)] = &effects[..] else {
            panic!("unexpected effects {effects:?}");
        };
        assert_eq!(req.unit_count, 3);
        s.apply(Event::FinalizeFailed).unwrap();

        s.apply(Event::DeleteBox(10002)).unwrap();
        assert_eq!(s.finalize_blocker(), None);
        s.apply(Event::BoxDeleted(10002)).unwrap();
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
    }

    #[test]
    fn open_order_with_frozen_manifest_needs_new_confirmation() {
        let mut sd = seed();
        sd.boxes = vec![saved_box(10001, &["A"])];
        let mut frozen = manifest::generate(&sd.order, &sd.boxes, None, None, &stamp()).unwrap();
        manifest::confirm(&mut frozen, &ManifestEdits::default()).unwrap();
        frozen.frozen = true;
        sd.manifest = Some(frozen);
        sd.collector = Some(CollectorInfo {
            unnamed: true,
            ..Default::default()
        });

        let mut s = FulfillmentSession::new(sd);
        assert!(!s.manifest().unwrap().frozen);
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
        s.apply(Event::ConfirmManifest(ManifestEdits::default())).unwrap();
        assert_eq!(s.finalize_blocker(), None);
    }

    #[test]
    fn collector_save_failure_restores_stage() {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::AssignManual(CollectorInfo {
            name: Some("Luis".into()),
            ..Default::default()
        }))
        .unwrap();
        s.apply(Event::ConfirmCollector).unwrap();
        assert_eq!(s.stage(), Stage::BuildingBox);

        s.apply(Event::CollectorSaveFailed).unwrap();
        assert_eq!(s.stage(), Stage::AssigningCollector);
        // The operator's entry is kept for the retry.
        assert!(matches!(s.collector(), Some(Collector::Manual(_))));

        s.apply(Event::ConfirmCollector).unwrap();
        s.apply(Event::CollectorSaved).unwrap();
        s.apply(Event::CollectorSaveFailed).unwrap();
        assert_eq!(s.stage(), Stage::BuildingBox);
    }

    #[test]
    fn manifest_save_failure_restores_previous_draft() {
        let mut s = FulfillmentSession::new(seed());
        s.apply(Event::BoxSaved(saved_box(10001, &["A"]))).unwrap();
        s.apply(Event::MarkUnnamed).unwrap();

        s.apply(Event::GenerateManifest(stamp())).unwrap();
        s.apply(Event::ManifestSaveFailed).unwrap();
        assert!(s.manifest().is_none());
        assert_eq!(s.stage(), Stage::AssigningCollector);

        s.apply(Event::GenerateManifest(stamp())).unwrap();
        s.apply(Event::ManifestSaved).unwrap();
        let draft = s.manifest().cloned();

        s.apply(Event::ConfirmManifest(ManifestEdits {
            manifest_number: Some("M-9".into()),
            ..Default::default()
        }))
        .unwrap();
        assert!(s.manifest().unwrap().is_ready());
        s.apply(Event::ManifestSaveFailed).unwrap();
        assert_eq!(s.manifest().cloned(), draft);
        assert_eq!(s.finalize_blocker(), Some(FinalizeBlocker::NoManifest));
    }

    #[test]
    fn edit_saved_box_replaces_in_place() {
        let mut sd = seed();
        sd.boxes = vec![saved_box(10001, &["A"])];
        let mut s = FulfillmentSession::new(sd);
        s.apply(Event::EditBox(10001)).unwrap();
        s.apply(Event::EditLineItem(
            1,
            LineItemChanges {
                quantity: Some(2),
                ..Default::default()
            },
        ))
        .unwrap();
        assert!(matches!(s.apply(Event::SaveBox), Err(ServiceError::Validation(_))));

        s.apply(Event::RecaptureLine(1)).unwrap();
        add(&mut s, "B").unwrap();
        let effects = s.apply(Event::SaveBox).unwrap();
        let [Effect::SaveBox(req)] = &effects[..] else {
            panic!("unexpected effects {effects:?}");
        };
        assert!(req.replace);
        assert_eq!(req.items[0].quantity(), 2);

        s.apply(Event::BoxSaved(saved_box(10001, &["A", "B"]))).unwrap();
        assert_eq!(s.boxes().len(), 1);
        assert_eq!(s.boxes()[0].units(), 2);
    }

    #[test]
    fn render_needs_manifest() {
        let mut s = FulfillmentSession::new(seed());
        assert!(matches!(s.apply(Event::RenderManifest), Err(ServiceError::Precondition(_))));
        s.apply(Event::BoxSaved(saved_box(10001, &["A"]))).unwrap();
        s.apply(Event::GenerateManifest(stamp())).unwrap();
        let effects = s.apply(Event::RenderManifest).unwrap();
        assert!(matches!(&effects[..], [Effect::Render(p)] if p.total_units == 1));
    }
}
