use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use logistics_core::ServiceError;

use crate::backend::FulfillmentBackend;
use crate::catalog::{CatalogEntry, CatalogKind};
use crate::model::{CollectorInfo, CollectorProfile};
use crate::service::FulfillmentService;

type ServiceState = Arc<FulfillmentService>;

pub fn router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route(
            "/work-orders/{id}/collector-info",
            get(get_collector_info).post(save_collector_info),
        )
        .route("/collectors", get(list_collectors))
        .route("/catalog/{kind}", get(list_catalog))
        .with_state(service)
}

// ---------------------------------------------------------------------------
// GET|POST /work-orders/:id/collector-info
// ---------------------------------------------------------------------------

async fn get_collector_info(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Option<CollectorInfo>>, ServiceError> {
    Ok(Json(service.collector_info(&id).await?))
}

async fn save_collector_info(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
    Json(info): Json<CollectorInfo>,
) -> Result<Json<CollectorInfo>, ServiceError> {
    Ok(Json(service.save_collector_info(&id, &info).await?))
}

// ---------------------------------------------------------------------------
// GET /collectors
// ---------------------------------------------------------------------------

async fn list_collectors(
    State(service): State<ServiceState>,
) -> Result<Json<Vec<CollectorProfile>>, ServiceError> {
    Ok(Json(service.collectors().await?))
}

// ---------------------------------------------------------------------------
// GET /catalog/:kind
// ---------------------------------------------------------------------------

async fn list_catalog(
    State(service): State<ServiceState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<CatalogEntry>>, ServiceError> {
    let kind = CatalogKind::from_route_segment(&kind)
        .ok_or_else(|| ServiceError::NotFound(format!("catalog {kind}")))?;
    Ok(Json(service.catalog(kind).await?))
}
