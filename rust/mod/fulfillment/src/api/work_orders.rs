use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use logistics_core::{ListResult, ServiceError};

use crate::backend::FulfillmentBackend;
use crate::manifest::Manifest;
use crate::model::{Completion, CreateWorkOrderRequest, FinalizeRequest, WorkOrder};
use crate::service::FulfillmentService;

type ServiceState = Arc<FulfillmentService>;

pub fn router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route("/work-orders", post(create_work_order).get(list_work_orders))
        .route("/work-orders/{id}", get(get_work_order))
        .route("/work-orders/{id}/next-box-number", get(next_box_number))
        .route("/work-orders/{id}/manifest", get(get_manifest).put(put_manifest))
        .route("/work-orders/{id}/@finalize", post(finalize))
        .route("/work-orders/{id}/@reopen", post(reopen))
        .with_state(service)
}

// ---------------------------------------------------------------------------
// POST /work-orders
// ---------------------------------------------------------------------------

async fn create_work_order(
    State(service): State<ServiceState>,
    Json(req): Json<CreateWorkOrderRequest>,
) -> Result<Json<WorkOrder>, ServiceError> {
    Ok(Json(service.create_work_order(req).await?))
}

// ---------------------------------------------------------------------------
// GET /work-orders
// ---------------------------------------------------------------------------

async fn list_work_orders(
    State(service): State<ServiceState>,
) -> Result<Json<ListResult<WorkOrder>>, ServiceError> {
    let mut orders = service.store().list_orders()?;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(ListResult::from_items(orders)))
}

// ---------------------------------------------------------------------------
// GET /work-orders/:id
// ---------------------------------------------------------------------------

async fn get_work_order(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<WorkOrder>, ServiceError> {
    Ok(Json(service.work_order(&id).await?))
}

// ---------------------------------------------------------------------------
// GET /work-orders/:id/next-box-number
// ---------------------------------------------------------------------------

async fn next_box_number(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let n = service.next_box_number(&id).await?;
    Ok(Json(serde_json::json!({ "nextBoxNumber": n })))
}

// ---------------------------------------------------------------------------
// GET|PUT /work-orders/:id/manifest
// ---------------------------------------------------------------------------

async fn get_manifest(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Option<Manifest>>, ServiceError> {
    Ok(Json(service.manifest(&id).await?))
}

async fn put_manifest(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
    Json(manifest): Json<Manifest>,
) -> Result<Json<Manifest>, ServiceError> {
    Ok(Json(service.save_manifest(&id, &manifest).await?))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@finalize
// ---------------------------------------------------------------------------

async fn finalize(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<Completion>, ServiceError> {
    Ok(Json(service.finalize(&id, &req).await?))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/@reopen
// ---------------------------------------------------------------------------

async fn reopen(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<WorkOrder>, ServiceError> {
    Ok(Json(service.reopen(&id).await?))
}
