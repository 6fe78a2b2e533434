use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use logistics_core::{millis_suffix, new_id, normalize_text, now_rfc3339, ServiceError};
use logistics_kv::KVStore;

use crate::allocator::next_box_number;
use crate::backend::FulfillmentBackend;
use crate::catalog::{load_entries, Catalog, CatalogEntry, CatalogKind};
use crate::config::FulfillmentConfig;
use crate::finalize::{closure_notes, FinalizeBlocker};
use crate::manifest::{self, Manifest, Stamp};
use crate::model::{
    BoxItem, BoxesView, Completion, CollectorInfo, CollectorProfile, CollectorSource,
    CreateWorkOrderRequest, FinalizeRequest, PackedBox, SaveBoxRequest, SerialEntry, WorkOrder,
    WorkOrderStatus,
};
use crate::store::{kv_err, FulfillmentStore};

const COLLECTOR_PREFIX: &str = "config:collector:";
const COLLECTOR_ROLE: &str = "logistics";

/// The in-process storage collaborator.
///
/// Validates every request again on the server side, so a misbehaving
/// client cannot persist a box that breaks the box invariants or close an
/// order that is not ready.
pub struct FulfillmentService {
    store: FulfillmentStore,
    config: FulfillmentConfig,
    /// Serializes read-check-write sequences (save, delete, finalize, reopen).
    writes: Mutex<()>,
}

impl FulfillmentService {
    pub fn new(kv: Arc<dyn KVStore>, config: FulfillmentConfig) -> Self {
        Self {
            store: FulfillmentStore::new(kv),
            config,
            writes: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &FulfillmentStore {
        &self.store
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    /// Register a work order handed over by the order system.
    pub async fn create_work_order(&self, req: CreateWorkOrderRequest) -> Result<WorkOrder, ServiceError> {
        let readable_id = normalize_text(Some(&req.readable_id))
            .ok_or_else(|| ServiceError::Validation("readableId is required".into()))?;
        let client = normalize_text(Some(&req.client))
            .ok_or_else(|| ServiceError::Validation("client is required".into()))?;
        for item in &req.expected_items {
            if item.expected_quantity == 0 {
                return Err(ServiceError::Validation(format!(
                    "expected quantity for {} {} must be greater than zero",
                    item.brand, item.model
                )));
            }
        }

        let order = WorkOrder {
            id: normalize_text(req.id.as_deref()).unwrap_or_else(new_id),
            title: normalize_text(req.title.as_deref())
                .unwrap_or_else(|| format!("Lote {readable_id}")),
            readable_id,
            client,
            expected_items: req.expected_items,
            status: WorkOrderStatus::Open,
            completed_at: None,
            completed_by: None,
            received_units: None,
            notes: None,
            assigned_to: None,
            created_at: now_rfc3339(),
        };

        let _w = self.writes.lock().await;
        self.store.create_order(&order)?;
        info!(work_order = %order.readable_id, "work order registered");
        Ok(order)
    }

    fn open_order(&self, key: &str) -> Result<WorkOrder, ServiceError> {
        let order = self.store.get_order(key)?;
        if order.is_closed() {
            return Err(ServiceError::Precondition(format!(
                "work order {} is closed",
                order.readable_id
            )));
        }
        Ok(order)
    }

    /// A confirmed draft no longer matches the boxes once one changes.
    /// The frozen record of an earlier closure is left as it is.
    fn unconfirm_manifest(&self, order: &WorkOrder) -> Result<(), ServiceError> {
        if let Some(mut draft) = self.store.manifest(&order.id)? {
            if draft.confirmed && !draft.frozen {
                draft.confirmed = false;
                self.store.put_manifest(&draft)?;
                debug!(work_order = %order.readable_id, "manifest draft needs confirming again");
            }
        }
        Ok(())
    }

    /// Normalize and check the items of a save request.
    fn checked_items(&self, items: &[BoxItem]) -> Result<Vec<BoxItem>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::Validation("box has no items".into()));
        }
        let catalog = Catalog::load(self.store.kv())?;

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            catalog.validate(&item.brand, &item.model, &item.product_type)?;

            let mut seen = HashSet::new();
            let mut serials = Vec::with_capacity(item.serials.len());
            for entry in &item.serials {
                let Some(serial) = normalize_text(Some(&entry.serial)) else {
                    return Err(ServiceError::Validation("serial number is empty".into()));
                };
                if !seen.insert(serial.clone()) {
                    return Err(ServiceError::Validation(format!("duplicate serial: {serial}")));
                }
                serials.push(SerialEntry::with_color(serial, entry.color.as_deref()));
            }
            if serials.is_empty() {
                return Err(ServiceError::Validation(format!(
                    "{} {} has no serials",
                    item.brand, item.model
                )));
            }

            out.push(BoxItem {
                brand: item.brand.trim().to_string(),
                model: item.model.trim().to_string(),
                product_type: item.product_type.trim().to_string(),
                serials,
            });
        }
        Ok(out)
    }

    fn load_collectors(&self) -> Result<Vec<CollectorProfile>, ServiceError> {
        let mut profiles = Vec::new();
        for (key, raw) in self.store.kv().scan(COLLECTOR_PREFIX).map_err(kv_err)? {
            let mut profile: CollectorProfile = serde_yaml::from_slice(&raw)
                .map_err(|e| ServiceError::Internal(format!("bad collector profile {key}: {e}")))?;
            if profile.id.is_empty() {
                profile.id = key[COLLECTOR_PREFIX.len()..].to_string();
            }
            if profile.active && profile.role == COLLECTOR_ROLE {
                profiles.push(profile);
            }
        }
        profiles.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(profiles)
    }
}

#[async_trait]
impl FulfillmentBackend for FulfillmentService {
    async fn work_order(&self, id: &str) -> Result<WorkOrder, ServiceError> {
        self.store.get_order(id)
    }

    async fn next_box_number(&self, work_order_id: &str) -> Result<u64, ServiceError> {
        self.store.get_order(work_order_id)?;
        let max = self.store.max_box_number()?;
        Ok(next_box_number(max, self.config.box_number_floor))
    }

    async fn save_box(&self, work_order_id: &str, req: &SaveBoxRequest) -> Result<PackedBox, ServiceError> {
        let _w = self.writes.lock().await;
        let order = self.open_order(work_order_id)?;

        let seal = normalize_text(Some(&req.seal))
            .ok_or_else(|| ServiceError::Validation("security seal is required".into()))?;
        let items = self.checked_items(&req.items)?;
        let number = req.box_number;

        let mut packed = PackedBox {
            box_number: number,
            work_order_id: order.id.clone(),
            seal,
            sku: Some(
                normalize_text(req.sku.as_deref())
                    .unwrap_or_else(|| format!("{}-{}", number, millis_suffix())),
            ),
            reception_code: None,
            items,
            created_at: now_rfc3339(),
        };

        if req.replace {
            let existing = self
                .store
                .get_box(number)?
                .ok_or_else(|| ServiceError::NotFound(format!("box {number}")))?;
            if existing.work_order_id != order.id {
                return Err(ServiceError::Conflict(format!(
                    "box {number} belongs to another work order"
                )));
            }
            packed.reception_code = existing.reception_code;
            packed.created_at = existing.created_at;
            self.store.put_box(&packed)?;
            self.unconfirm_manifest(&order)?;
            info!(work_order = %order.readable_id, box_number = number, "box replaced");
            return Ok(packed);
        }

        if !self.store.insert_box(&packed)? {
            warn!(work_order = %order.readable_id, box_number = number, "box number collision");
            return Err(ServiceError::Conflict(format!(
                "box {number} already exists; fetch the next box number and retry"
            )));
        }
        self.unconfirm_manifest(&order)?;
        info!(
            work_order = %order.readable_id,
            box_number = number,
            units = packed.units(),
            "box saved"
        );
        Ok(packed)
    }

    async fn delete_box(&self, work_order_id: &str, box_number: u64) -> Result<(), ServiceError> {
        let _w = self.writes.lock().await;
        let order = self.open_order(work_order_id)?;
        match self.store.get_box(box_number)? {
            Some(b) if b.work_order_id == order.id => {
                self.store.delete_box(box_number)?;
                self.unconfirm_manifest(&order)?;
                info!(work_order = %order.readable_id, box_number, "box deleted");
                Ok(())
            }
            _ => Err(ServiceError::NotFound(format!(
                "box {box_number} in work order {}",
                order.readable_id
            ))),
        }
    }

    async fn boxes(&self, work_order_id: &str) -> Result<BoxesView, ServiceError> {
        let ticket = self.store.get_order(work_order_id)?;
        let boxes = self.store.boxes_for(&ticket.id)?;
        Ok(BoxesView { ticket, boxes })
    }

    async fn collector_info(&self, work_order_id: &str) -> Result<Option<CollectorInfo>, ServiceError> {
        let order = self.store.get_order(work_order_id)?;
        self.store.collector_info(&order.id)
    }

    async fn save_collector_info(
        &self,
        work_order_id: &str,
        info: &CollectorInfo,
    ) -> Result<CollectorInfo, ServiceError> {
        let order = self.open_order(work_order_id)?;
        let info = info.normalized();
        if let Some(profile_id) = &info.profile_id {
            if !self.load_collectors()?.iter().any(|p| &p.id == profile_id) {
                return Err(ServiceError::Validation(format!(
                    "unknown collector profile: {profile_id}"
                )));
            }
        }
        self.store.put_collector_info(&order.id, &info)?;
        debug!(work_order = %order.readable_id, "collector info saved");
        Ok(info)
    }

    async fn collectors(&self) -> Result<Vec<CollectorProfile>, ServiceError> {
        self.load_collectors()
    }

    async fn manifest(&self, work_order_id: &str) -> Result<Option<Manifest>, ServiceError> {
        let order = self.store.get_order(work_order_id)?;
        self.store.manifest(&order.id)
    }

    async fn save_manifest(&self, work_order_id: &str, manifest: &Manifest) -> Result<Manifest, ServiceError> {
        let _w = self.writes.lock().await;
        let order = self.store.get_order(work_order_id)?;
        if order.is_closed() {
            return Err(ServiceError::Precondition(format!(
                "work order {} is closed; its manifest is frozen",
                order.readable_id
            )));
        }
        let mut draft = manifest.clone();
        draft.work_order_id = order.id.clone();
        draft.frozen = false;
        self.store.put_manifest(&draft)?;
        debug!(work_order = %order.readable_id, manifest = %draft.manifest_number, "manifest draft saved");
        Ok(draft)
    }

    async fn finalize(&self, work_order_id: &str, req: &FinalizeRequest) -> Result<Completion, ServiceError> {
        let _w = self.writes.lock().await;
        let mut order = self.store.get_order(work_order_id)?;
        if order.is_closed() {
            return Err(FinalizeBlocker::AlreadyClosed.into());
        }

        let boxes: Vec<PackedBox> = self
            .store
            .boxes_for(&order.id)?
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect();
        if boxes.is_empty() {
            return Err(FinalizeBlocker::NoBoxes.into());
        }
        let (Some(number), Some(seal)) = (
            normalize_text(Some(&req.manifest_number)),
            normalize_text(Some(&req.security_seal)),
        ) else {
            return Err(FinalizeBlocker::NoManifest.into());
        };

        let units: u32 = boxes.iter().map(PackedBox::units).sum();
        if units != req.unit_count || boxes.len() as u32 != req.box_count {
            warn!(
                work_order = %order.readable_id,
                reported_boxes = req.box_count,
                reported_units = req.unit_count,
                boxes = boxes.len(),
                units,
                "finalize counts differ from saved boxes; using saved boxes"
            );
        }

        // The listing and totals always come from the boxes saved right now.
        let previous = self.store.manifest(&order.id)?;
        let mut frozen = manifest::generate(
            &order,
            &boxes,
            Some(req.collector.clone()),
            previous.as_ref(),
            &Stamp::now(),
        )?;
        frozen.manifest_number = number;
        frozen.security_seal = seal;
        frozen.notes = normalize_text(req.notes.as_deref());
        frozen.other_details = normalize_text(req.other_details.as_deref());
        frozen.confirmed = true;
        frozen.frozen = true;
        frozen.payload.manifest_number = frozen.manifest_number.clone();
        frozen.payload.security_seal = frozen.security_seal.clone();
        frozen.payload.notes = frozen.notes.clone();
        frozen.payload.other_details = frozen.other_details.clone();

        let completed_at = now_rfc3339();
        let completed_by = normalize_text(req.closed_by.as_deref())
            .or_else(|| self.config.default_operator.clone());

        order.status = WorkOrderStatus::Closed;
        order.completed_at = Some(completed_at.clone());
        order.completed_by = completed_by.clone();
        order.received_units = Some(units);
        order.notes = closure_notes(req.notes.as_deref(), req.other_details.as_deref());
        order.assigned_to = match req.collector.source {
            CollectorSource::Profile => req.collector.profile_id.clone(),
            _ => None,
        };

        self.store.close(&order, &frozen, &req.collector.to_record())?;
        info!(
            work_order = %order.readable_id,
            manifest = %frozen.manifest_number,
            boxes = boxes.len(),
            units,
            "work order finalized"
        );

        Ok(Completion {
            work_order_id: order.id,
            completed_at,
            completed_by,
            received_units: units,
        })
    }

    async fn reopen(&self, work_order_id: &str) -> Result<WorkOrder, ServiceError> {
        let _w = self.writes.lock().await;
        let mut order = self.store.get_order(work_order_id)?;
        if !order.is_closed() {
            return Err(ServiceError::Precondition(format!(
                "work order {} is not closed",
                order.readable_id
            )));
        }
        order.status = WorkOrderStatus::Open;
        order.completed_at = None;
        order.completed_by = None;
        self.store.put_order(&order)?;
        info!(work_order = %order.readable_id, "work order reopened");
        Ok(order)
    }

    async fn catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, ServiceError> {
        load_entries(self.store.kv(), kind)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::temp_kv;
    use logistics_kv::{OverlayKV, RedbStore};

    /// Reference data shared by the service, controller and API tests.
    pub(crate) fn seed_reference(kv: &OverlayKV<RedbStore>) {
        let entries: &[(&str, &str)] = &[
            ("config:catalog:brand:dell", "name: Dell\n"),
            ("config:catalog:brand:hp", "name: HP\n"),
            ("config:catalog:model:optiplex", "name: OptiPlex\nbrand: Dell\n"),
            ("config:catalog:model:elitebook", "name: EliteBook\nbrand: HP\n"),
            ("config:catalog:product-type:desktop", "name: Desktop\n"),
            ("config:catalog:product-type:laptop", "name: Laptop\n"),
            (
                "config:collector:ana",
                "fullName: Ana Ruiz\nphone: 555-0101\nvehiclePlate: ABC-123\n",
            ),
            ("config:collector:bruno", "fullName: Bruno Diaz\nactive: false\n"),
            ("config:collector:carla", "fullName: Carla Soto\nrole: admin\n"),
            ("config:collector:aaron", "fullName: Aaron Vega\n"),
        ];
        for (key, yaml) in entries {
            kv.insert_file_entry(key.to_string(), yaml.as_bytes().to_vec());
        }
    }

    pub(crate) fn test_service() -> (tempfile::TempDir, Arc<FulfillmentService>) {
        let (dir, kv) = temp_kv();
        seed_reference(&kv);
        let config = FulfillmentConfig {
            default_operator: Some("ops-default".into()),
            ..Default::default()
        };
        (dir, Arc::new(FulfillmentService::new(kv, config)))
    }

    pub(crate) async fn create_order(svc: &FulfillmentService, readable: &str) -> WorkOrder {
        svc.create_work_order(CreateWorkOrderRequest {
            id: None,
            readable_id: readable.into(),
            client: "Acme".into(),
            title: None,
            expected_items: vec![],
        })
        .await
        .unwrap()
    }

    pub(crate) fn dell_item(serials: &[&str]) -> BoxItem {
        BoxItem {
            brand: "Dell".into(),
            model: "OptiPlex".into(),
            product_type: "Desktop".into(),
            serials: serials.iter().map(|s| SerialEntry::new(*s)).collect(),
        }
    }

    fn save_req(number: u64, seal: &str, items: Vec<BoxItem>) -> SaveBoxRequest {
        SaveBoxRequest {
            box_number: number,
            seal: seal.into(),
            sku: None,
            items,
            replace: false,
        }
    }

    fn finalize_req(units: u32) -> FinalizeRequest {
        FinalizeRequest {
            collector: crate::collector::Collector::Unnamed.resolve("Recolector sin nombre"),
            box_count: 1,
            unit_count: units,
            manifest_number: "10001-000001".into(),
            security_seal: "PS-TK-1-000001".into(),
            notes: Some("fragile".into()),
            other_details: Some("dock 3".into()),
            closed_by: None,
        }
    }

    #[tokio::test]
    async fn create_defaults_title_and_rejects_blank() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        assert_eq!(order.title, "Lote TK-1");
        assert_eq!(order.status, WorkOrderStatus::Open);

        let bad = svc
            .create_work_order(CreateWorkOrderRequest {
                id: None,
                readable_id: "  ".into(),
                client: "Acme".into(),
                title: None,
                expected_items: vec![],
            })
            .await;
        assert!(matches!(bad, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn save_box_then_next_number_advances() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;

        let n = svc.next_box_number(&order.id).await.unwrap();
        assert_eq!(n, 10001);

        let saved = svc
            .save_box(&order.id, &save_req(n, " SEC-1001 ", vec![dell_item(&["SN1", "SN2"])]))
            .await
            .unwrap();
        assert_eq!(saved.seal, "SEC-1001");
        assert!(saved.sku.as_deref().unwrap().starts_with("10001-"));
        assert_eq!(saved.units(), 2);

        assert_eq!(svc.next_box_number("tk-1").await.unwrap(), n + 1);
    }

    #[tokio::test]
    async fn save_box_validates_server_side() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;

        let blank_seal = save_req(10001, "  ", vec![dell_item(&["SN1"])]);
        assert!(matches!(svc.save_box(&order.id, &blank_seal).await, Err(ServiceError::Validation(_))));

        let empty = save_req(10001, "S", vec![]);
        assert!(matches!(svc.save_box(&order.id, &empty).await, Err(ServiceError::Validation(_))));

        let no_serials = save_req(10001, "S", vec![dell_item(&[])]);
        assert!(matches!(svc.save_box(&order.id, &no_serials).await, Err(ServiceError::Validation(_))));

        let dup = save_req(10001, "S", vec![dell_item(&["SN1", " SN1"])]);
        assert!(matches!(svc.save_box(&order.id, &dup).await, Err(ServiceError::Validation(_))));

        let mut unknown = dell_item(&["SN1"]);
        unknown.model = "Latitude".into();
        let bad_ref = save_req(10001, "S", vec![unknown]);
        assert!(matches!(svc.save_box(&order.id, &bad_ref).await, Err(ServiceError::Validation(_))));

        assert!(svc.boxes(&order.id).await.unwrap().boxes.is_empty());
    }

    #[tokio::test]
    async fn same_number_twice_conflicts_across_orders() {
        let (_dir, svc) = test_service();
        let a = create_order(&svc, "TK-A").await;
        let b = create_order(&svc, "TK-B").await;

        svc.save_box(&a.id, &save_req(10001, "S", vec![dell_item(&["A1"])])).await.unwrap();
        let err = svc
            .save_box(&b.id, &save_req(10001, "S", vec![dell_item(&["B1"])]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Numbering is global.
        assert_eq!(svc.next_box_number(&b.id).await.unwrap(), 10002);
    }

    #[tokio::test]
    async fn replace_overwrites_own_box_only() {
        let (_dir, svc) = test_service();
        let a = create_order(&svc, "TK-A").await;
        let b = create_order(&svc, "TK-B").await;
        svc.save_box(&a.id, &save_req(10001, "S1", vec![dell_item(&["A1"])])).await.unwrap();

        let mut edit = save_req(10001, "S1-bis", vec![dell_item(&["A1", "A2"])]);
        edit.replace = true;
        let replaced = svc.save_box(&a.id, &edit).await.unwrap();
        assert_eq!(replaced.units(), 2);
        assert_eq!(svc.boxes(&a.id).await.unwrap().boxes[0].seal, "S1-bis");

        assert!(matches!(svc.save_box(&b.id, &edit).await, Err(ServiceError::Conflict(_))));

        let mut missing = edit.clone();
        missing.box_number = 19999;
        assert!(matches!(svc.save_box(&a.id, &missing).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn collectors_directory_filters_and_sorts() {
        let (_dir, svc) = test_service();
        let names: Vec<_> = svc
            .collectors()
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.full_name))
            .collect();
        assert_eq!(
            names,
            vec![
                ("aaron".to_string(), "Aaron Vega".to_string()),
                ("ana".to_string(), "Ana Ruiz".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn collector_info_rejects_unknown_profile() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        let info = CollectorInfo {
            profile_id: Some("ghost".into()),
            ..Default::default()
        };
        assert!(matches!(
            svc.save_collector_info(&order.id, &info).await,
            Err(ServiceError::Validation(_))
        ));

        let ok = CollectorInfo {
            name: Some(" Luis ".into()),
            profile_id: Some("ana".into()),
            ..Default::default()
        };
        let saved = svc.save_collector_info(&order.id, &ok).await.unwrap();
        assert_eq!(saved.name.as_deref(), Some("Luis"));
        assert_eq!(svc.collector_info(&order.id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn finalize_closes_and_reopen_restores() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        svc.save_box(&order.id, &save_req(10001, "S", vec![dell_item(&["SN1", "SN2"])]))
            .await
            .unwrap();

        let done = svc.finalize(&order.id, &finalize_req(2)).await.unwrap();
        assert_eq!(done.received_units, 2);
        assert_eq!(done.completed_by.as_deref(), Some("ops-default"));

        let closed = svc.work_order(&order.id).await.unwrap();
        assert!(closed.is_closed());
        assert_eq!(closed.notes.as_deref(), Some("fragile\n\ndock 3"));
        let frozen = svc.manifest(&order.id).await.unwrap().unwrap();
        assert!(frozen.frozen);
        assert_eq!(frozen.manifest_number, "10001-000001");

        // Closed orders reject every mutation.
        let again = svc.finalize(&order.id, &finalize_req(2)).await.unwrap_err();
        assert!(matches!(again, ServiceError::Precondition(ref m) if m.contains("already closed")));
        assert!(matches!(svc.delete_box(&order.id, 10001).await, Err(ServiceError::Precondition(_))));
        assert!(matches!(
            svc.save_box(&order.id, &save_req(10002, "S", vec![dell_item(&["X"])])).await,
            Err(ServiceError::Precondition(_))
        ));
        assert!(matches!(svc.save_manifest(&order.id, &frozen).await, Err(ServiceError::Precondition(_))));

        let boxes_before = svc.boxes(&order.id).await.unwrap().boxes;
        let reopened = svc.reopen(&order.id).await.unwrap();
        assert_eq!(reopened.status, WorkOrderStatus::Open);
        assert!(reopened.completed_at.is_none());
        assert!(reopened.completed_by.is_none());
        assert_eq!(svc.boxes(&order.id).await.unwrap().boxes, boxes_before);
        assert_eq!(svc.manifest(&order.id).await.unwrap(), Some(frozen));

        assert!(matches!(svc.reopen(&order.id).await, Err(ServiceError::Precondition(_))));
    }

    #[tokio::test]
    async fn finalize_without_boxes_leaves_order_open() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        let err = svc.finalize(&order.id, &finalize_req(0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Precondition(ref m) if m.starts_with("no boxes")));
        assert!(!svc.work_order(&order.id).await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn finalize_records_profile_assignment() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        svc.save_box(&order.id, &save_req(10001, "S", vec![dell_item(&["SN1"])]))
            .await
            .unwrap();

        let profile = svc.collectors().await.unwrap().remove(1);
        let mut req = finalize_req(1);
        req.collector = crate::collector::Collector::Profile(profile).resolve("x");
        req.closed_by = Some("maria".into());
        let done = svc.finalize(&order.id, &req).await.unwrap();
        assert_eq!(done.completed_by.as_deref(), Some("maria"));
        assert_eq!(svc.work_order(&order.id).await.unwrap().assigned_to.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn frozen_manifest_lists_boxes_saved_after_confirming() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        let first = svc
            .save_box(&order.id, &save_req(10001, "S1", vec![dell_item(&["SN1"])]))
            .await
            .unwrap();

        let mut draft = manifest::generate(&order, &[first], None, None, &Stamp::now()).unwrap();
        manifest::confirm(&mut draft, &Default::default()).unwrap();
        svc.save_manifest(&order.id, &draft).await.unwrap();
        assert!(svc.manifest(&order.id).await.unwrap().unwrap().is_ready());

        svc.save_box(&order.id, &save_req(10002, "S2", vec![dell_item(&["SN2", "SN3"])]))
            .await
            .unwrap();
        assert!(!svc.manifest(&order.id).await.unwrap().unwrap().is_ready());

        let mut req = finalize_req(3);
        req.box_count = 2;
        req.manifest_number = draft.manifest_number.clone();
        svc.finalize(&order.id, &req).await.unwrap();

        let frozen = svc.manifest(&order.id).await.unwrap().unwrap();
        let listed: Vec<_> = frozen.payload.boxes.iter().map(|b| b.box_number).collect();
        assert_eq!(listed, vec![10001, 10002]);
        assert_eq!(frozen.payload.total_boxes, 2);
        assert_eq!(frozen.payload.total_units, 3);
        assert_eq!(frozen.payload.manifest_number, draft.manifest_number);
        assert_eq!(svc.work_order(&order.id).await.unwrap().received_units, Some(3));
    }

    #[tokio::test]
    async fn finalize_keeps_manual_collector_for_reopen() {
        let (_dir, svc) = test_service();
        let order = create_order(&svc, "TK-1").await;
        svc.save_box(&order.id, &save_req(10001, "S", vec![dell_item(&["SN1"])]))
            .await
            .unwrap();
        assert!(svc.collector_info(&order.id).await.unwrap().is_none());

        let manual = CollectorInfo {
            name: Some("Luis".into()),
            vehicle_plate: Some("P-1".into()),
            ..Default::default()
        };
        let mut req = finalize_req(1);
        req.collector = crate::collector::Collector::Manual(manual).resolve("x");
        svc.finalize(&order.id, &req).await.unwrap();
        svc.reopen(&order.id).await.unwrap();

        let record = svc.collector_info(&order.id).await.unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Luis"));
        assert_eq!(record.vehicle_plate.as_deref(), Some("P-1"));
        assert!(!record.unnamed);
    }

    #[tokio::test]
    async fn delete_box_checks_ownership() {
        let (_dir, svc) = test_service();
        let a = create_order(&svc, "TK-A").await;
        let b = create_order(&svc, "TK-B").await;
        svc.save_box(&a.id, &save_req(10001, "S", vec![dell_item(&["A1"])])).await.unwrap();

        assert!(matches!(svc.delete_box(&b.id, 10001).await, Err(ServiceError::NotFound(_))));
        svc.delete_box(&a.id, 10001).await.unwrap();
        assert!(svc.boxes(&a.id).await.unwrap().boxes.is_empty());
    }

    #[tokio::test]
    async fn catalog_lists_by_kind() {
        let (_dir, svc) = test_service();
        let models = svc.catalog(CatalogKind::Model).await.unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["EliteBook", "OptiPlex"]);
    }
}
