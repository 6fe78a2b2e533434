use async_trait::async_trait;

use logistics_core::ServiceError;

use crate::catalog::{CatalogEntry, CatalogKind};
use crate::manifest::Manifest;
use crate::model::{
    BoxesView, Completion, CollectorInfo, CollectorProfile, FinalizeRequest, PackedBox,
    SaveBoxRequest, WorkOrder,
};

/// Every call the fulfillment workflow makes outside itself.
///
/// `FulfillmentService` answers in-process from the KV store;
/// `HttpBackend` answers over HTTP against a running server. Each call may
/// fail independently; remote failures surface as `ServiceError::Storage`.
#[async_trait]
pub trait FulfillmentBackend: Send + Sync {
    async fn work_order(&self, id: &str) -> Result<WorkOrder, ServiceError>;

    async fn next_box_number(&self, work_order_id: &str) -> Result<u64, ServiceError>;

    async fn save_box(&self, work_order_id: &str, req: &SaveBoxRequest) -> Result<PackedBox, ServiceError>;

    async fn delete_box(&self, work_order_id: &str, box_number: u64) -> Result<(), ServiceError>;

    async fn boxes(&self, work_order_id: &str) -> Result<BoxesView, ServiceError>;

    async fn collector_info(&self, work_order_id: &str) -> Result<Option<CollectorInfo>, ServiceError>;

    async fn save_collector_info(
        &self,
        work_order_id: &str,
        info: &CollectorInfo,
    ) -> Result<CollectorInfo, ServiceError>;

    async fn collectors(&self) -> Result<Vec<CollectorProfile>, ServiceError>;

    async fn manifest(&self, work_order_id: &str) -> Result<Option<Manifest>, ServiceError>;

    async fn save_manifest(&self, work_order_id: &str, manifest: &Manifest) -> Result<Manifest, ServiceError>;

    async fn finalize(&self, work_order_id: &str, req: &FinalizeRequest) -> Result<Completion, ServiceError>;

    async fn reopen(&self, work_order_id: &str) -> Result<WorkOrder, ServiceError>;

    async fn catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntry>, ServiceError>;
}
