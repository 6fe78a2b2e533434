mod boxes;
mod directory;
mod work_orders;

use std::sync::Arc;
use axum::Router;

use crate::service::FulfillmentService;

/// Build the complete fulfillment router.
///
/// Routes:
/// - `POST   /work-orders`                              intake a work order
/// - `GET    /work-orders`                              list work orders
/// - `GET    /work-orders/:id`                          get by id or readable id
/// - `GET    /work-orders/:id/next-box-number`          next free box number
/// - `GET    /work-orders/:id/boxes`                    order + saved boxes
/// - `POST   /work-orders/:id/boxes`                    save (or replace) a box
/// - `DELETE /work-orders/:id/boxes/:box_number`        delete a box
/// - `GET    /work-orders/:id/collector-info`           collector record
/// - `POST   /work-orders/:id/collector-info`           write collector record
/// - `GET    /work-orders/:id/manifest`                 manifest draft / frozen record
/// - `PUT    /work-orders/:id/manifest`                 store a manifest draft
/// - `POST   /work-orders/:id/@finalize`                close the order
/// - `POST   /work-orders/:id/@reopen`                  reopen a closed order
/// - `GET    /collectors`                               collector directory
/// - `GET    /catalog/:kind`                            brands, models, product-types
pub fn router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .merge(work_orders::router(Arc::clone(&service)))
        .merge(boxes::router(Arc::clone(&service)))
        .merge(directory::router(service))
}
