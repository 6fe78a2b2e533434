//! Work-order fulfillment: packing boxes with serialized units, assigning a
//! collector, generating the dispatch manifest and closing the order.
//!
//! The operator-facing workflow is a pure state machine
//! ([`session::FulfillmentSession`]) driven by a controller
//! ([`controller::FulfillmentController`]) that talks to a
//! [`backend::FulfillmentBackend`], either in-process
//! ([`service::FulfillmentService`]) or over HTTP ([`client::HttpBackend`]).

pub mod allocator;
pub mod api;
pub mod backend;
pub mod builder;
pub mod catalog;
pub mod client;
pub mod collector;
pub mod config;
pub mod controller;
pub mod finalize;
pub mod manifest;
pub mod model;
pub mod serial;
pub mod service;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::Router;
use logistics_core::Module;
use logistics_kv::KVStore;

pub use backend::FulfillmentBackend;
pub use client::HttpBackend;
pub use config::FulfillmentConfig;
pub use controller::{FulfillmentController, SingleFlight, Workbench};
pub use service::FulfillmentService;
pub use session::{Effect, Event, FulfillmentSession, Stage};

/// The fulfillment module: HTTP routes plus the in-process service.
pub struct FulfillmentModule {
    service: Arc<FulfillmentService>,
}

impl FulfillmentModule {
    pub fn new(kv: Arc<dyn KVStore>, config: FulfillmentConfig) -> Self {
        Self {
            service: Arc::new(FulfillmentService::new(kv, config)),
        }
    }

    pub fn service(&self) -> &Arc<FulfillmentService> {
        &self.service
    }

    /// Controllers running in the same process as the store.
    pub fn workbench(&self) -> Workbench {
        let label = self.service.config().unnamed_label.clone();
        Workbench::new(Arc::clone(&self.service) as Arc<dyn FulfillmentBackend>)
            .with_unnamed_label(label)
    }
}

impl Module for FulfillmentModule {
    fn name(&self) -> &str {
        "fulfillment"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateWorkOrderRequest;
    use crate::service::tests::{dell_item, seed_reference};
    use crate::store::tests::temp_kv;

    #[tokio::test]
    async fn module_workbench_uses_configured_label() {
        let (_dir, kv) = temp_kv();
        seed_reference(&kv);
        let config = FulfillmentConfig {
            unnamed_label: "Sin nombre".into(),
            ..Default::default()
        };
        let module = FulfillmentModule::new(kv, config);
        assert_eq!(module.name(), "fulfillment");

        let order = module
            .service()
            .create_work_order(CreateWorkOrderRequest {
                id: None,
                readable_id: "TK-1".into(),
                client: "Acme".into(),
                title: None,
                expected_items: vec![],
            })
            .await
            .unwrap();
        module
            .service()
            .save_box(
                &order.id,
                &crate::model::SaveBoxRequest {
                    box_number: 10001,
                    seal: "SEC-1".into(),
                    sku: None,
                    items: vec![dell_item(&["SN1"])],
                    replace: false,
                },
            )
            .await
            .unwrap();

        let mut ctrl = module.workbench().open(&order.id, None).await.unwrap();
        assert_eq!(ctrl.session().next_number(), Some(10002));
        ctrl.dispatch(Event::MarkUnnamed).await.unwrap();
        ctrl.generate_manifest().await.unwrap();
        let payload = &ctrl.session().manifest().unwrap().payload;
        assert_eq!(payload.collector.as_ref().unwrap().name, "Sin nombre");
    }
}
