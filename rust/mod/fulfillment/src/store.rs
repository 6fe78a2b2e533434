use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use logistics_core::ServiceError;
use logistics_kv::{KVError, KVStore};

use crate::manifest::Manifest;
use crate::model::{CollectorInfo, PackedBox, WorkOrder};

const ORDER_PREFIX: &str = "fulfillment:order:";
const BOX_PREFIX: &str = "fulfillment:box:";
const COLLECTOR_PREFIX: &str = "fulfillment:collector:";
const MANIFEST_PREFIX: &str = "fulfillment:manifest:";

/// Map a KV failure onto the shared error type.
pub(crate) fn kv_err(e: KVError) -> ServiceError {
    match e {
        KVError::ReadOnly(key) => ServiceError::ReadOnly(format!("key is read-only: {key}")),
        other => ServiceError::Storage(other.to_string()),
    }
}

fn order_key(id: &str) -> String {
    format!("{ORDER_PREFIX}{id}")
}

/// Zero-padded to the width of `u64::MAX` so that key order is numeric order.
fn box_key(number: u64) -> String {
    format!("{BOX_PREFIX}{number:020}")
}

fn collector_key(order_id: &str) -> String {
    format!("{COLLECTOR_PREFIX}{order_id}")
}

fn manifest_key(order_id: &str) -> String {
    format!("{MANIFEST_PREFIX}{order_id}")
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ServiceError> {
    serde_json::to_vec(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(raw).map_err(|e| ServiceError::Storage(format!("bad record {key}: {e}")))
}

/// Persistent storage for work orders, boxes, collector records and
/// manifests, backed by the KV store.
///
/// Box keys are global (one box number is used by at most one order);
/// creation goes through `insert_if_absent`, so two racing saves of the
/// same number get exactly one winner.
pub struct FulfillmentStore {
    kv: Arc<dyn KVStore>,
}

impl FulfillmentStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &dyn KVStore {
        self.kv.as_ref()
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ServiceError> {
        match self.kv.get(key).map_err(kv_err)? {
            Some(raw) => decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ServiceError> {
        self.kv.set(key, &encode(value)?).map_err(kv_err)
    }

    // -----------------------------------------------------------------------
    // Work orders
    // -----------------------------------------------------------------------

    /// Look up an order by id, falling back to its readable id.
    pub fn get_order(&self, key: &str) -> Result<WorkOrder, ServiceError> {
        if let Some(order) = self.read::<WorkOrder>(&order_key(key))? {
            return Ok(order);
        }
        self.list_orders()?
            .into_iter()
            .find(|o| o.matches(key))
            .ok_or_else(|| ServiceError::NotFound(format!("work order {key}")))
    }

    pub fn list_orders(&self) -> Result<Vec<WorkOrder>, ServiceError> {
        self.kv
            .scan(ORDER_PREFIX)
            .map_err(kv_err)?
            .iter()
            .map(|(k, v)| decode(k, v))
            .collect()
    }

    /// Insert a new order; id and readable id must both be unused.
    pub fn create_order(&self, order: &WorkOrder) -> Result<(), ServiceError> {
        if self
            .list_orders()?
            .iter()
            .any(|o| o.readable_id.eq_ignore_ascii_case(&order.readable_id))
        {
            return Err(ServiceError::Conflict(format!(
                "work order {} already exists",
                order.readable_id
            )));
        }
        let inserted = self
            .kv
            .insert_if_absent(&order_key(&order.id), &encode(order)?)
            .map_err(kv_err)?;
        if !inserted {
            return Err(ServiceError::Conflict(format!("work order {} already exists", order.id)));
        }
        Ok(())
    }

    pub fn put_order(&self, order: &WorkOrder) -> Result<(), ServiceError> {
        self.write(&order_key(&order.id), order)
    }

    // -----------------------------------------------------------------------
    // Boxes
    // -----------------------------------------------------------------------

    pub fn get_box(&self, number: u64) -> Result<Option<PackedBox>, ServiceError> {
        self.read(&box_key(number))
    }

    /// Boxes of one order, ascending by number.
    pub fn boxes_for(&self, order_id: &str) -> Result<Vec<PackedBox>, ServiceError> {
        let mut boxes = Vec::new();
        for (key, raw) in self.kv.scan(BOX_PREFIX).map_err(kv_err)? {
            let b: PackedBox = decode(&key, &raw)?;
            if b.work_order_id == order_id {
                boxes.push(b);
            }
        }
        Ok(boxes)
    }

    /// Highest box number saved by any order.
    pub fn max_box_number(&self) -> Result<Option<u64>, ServiceError> {
        let rows = self.kv.scan(BOX_PREFIX).map_err(kv_err)?;
        match rows.last() {
            Some((key, raw)) => Ok(Some(decode::<PackedBox>(key, raw)?.box_number)),
            None => Ok(None),
        }
    }

    /// Create a box. Returns `false` when the number is already taken.
    pub fn insert_box(&self, b: &PackedBox) -> Result<bool, ServiceError> {
        self.kv
            .insert_if_absent(&box_key(b.box_number), &encode(b)?)
            .map_err(kv_err)
    }

    pub fn put_box(&self, b: &PackedBox) -> Result<(), ServiceError> {
        self.write(&box_key(b.box_number), b)
    }

    pub fn delete_box(&self, number: u64) -> Result<(), ServiceError> {
        self.kv.delete(&box_key(number)).map_err(kv_err)
    }

    // -----------------------------------------------------------------------
    // Collector record / manifest
    // -----------------------------------------------------------------------

    pub fn collector_info(&self, order_id: &str) -> Result<Option<CollectorInfo>, ServiceError> {
        self.read(&collector_key(order_id))
    }

    pub fn put_collector_info(&self, order_id: &str, info: &CollectorInfo) -> Result<(), ServiceError> {
        self.write(&collector_key(order_id), info)
    }

    pub fn manifest(&self, order_id: &str) -> Result<Option<Manifest>, ServiceError> {
        self.read(&manifest_key(order_id))
    }

    pub fn put_manifest(&self, manifest: &Manifest) -> Result<(), ServiceError> {
        self.write(&manifest_key(&manifest.work_order_id), manifest)
    }

    /// Write the closed order, its frozen manifest and the collector it was
    /// closed with in one transaction.
    pub fn close(
        &self,
        order: &WorkOrder,
        manifest: &Manifest,
        collector: &CollectorInfo,
    ) -> Result<(), ServiceError> {
        let order_k = order_key(&order.id);
        let manifest_k = manifest_key(&manifest.work_order_id);
        let collector_k = collector_key(&order.id);
        let order_v = encode(order)?;
        let manifest_v = encode(manifest)?;
        let collector_v = encode(collector)?;
        self.kv
            .batch_set(&[
                (order_k.as_str(), order_v.as_slice()),
                (manifest_k.as_str(), manifest_v.as_slice()),
                (collector_k.as_str(), collector_v.as_slice()),
            ])
            .map_err(kv_err)
    }
}
