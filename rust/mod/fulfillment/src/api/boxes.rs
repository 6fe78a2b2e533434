use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};

use logistics_core::ServiceError;

use crate::backend::FulfillmentBackend;
use crate::model::{BoxesView, PackedBox, SaveBoxRequest};
use crate::service::FulfillmentService;

type ServiceState = Arc<FulfillmentService>;

pub fn router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route("/work-orders/{id}/boxes", get(list_boxes).post(save_box))
        .route("/work-orders/{id}/boxes/{box_number}", delete(delete_box))
        .with_state(service)
}

// ---------------------------------------------------------------------------
// GET /work-orders/:id/boxes
// ---------------------------------------------------------------------------

async fn list_boxes(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<BoxesView>, ServiceError> {
    Ok(Json(service.boxes(&id).await?))
}

// ---------------------------------------------------------------------------
// POST /work-orders/:id/boxes
// ---------------------------------------------------------------------------

async fn save_box(
    State(service): State<ServiceState>,
    Path(id): Path<String>,
    Json(req): Json<SaveBoxRequest>,
) -> Result<Json<PackedBox>, ServiceError> {
    Ok(Json(service.save_box(&id, &req).await?))
}

// ---------------------------------------------------------------------------
// DELETE /work-orders/:id/boxes/:box_number
// ---------------------------------------------------------------------------

async fn delete_box(
    State(service): State<ServiceState>,
    Path((id, box_number)): Path<(String, u64)>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    service.delete_box(&id, box_number).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
