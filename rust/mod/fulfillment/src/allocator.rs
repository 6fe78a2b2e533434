use std::sync::Arc;

use logistics_core::ServiceError;

use crate::backend::FulfillmentBackend;

/// Next box number given the highest one ever saved.
///
/// `max(max_saved + 1, floor)`; the floor is also the first number issued.
pub fn next_box_number(max_saved: Option<u64>, floor: u64) -> u64 {
    match max_saved {
        Some(max) => max.saturating_add(1).max(floor),
        None => floor,
    }
}

/// Issues box numbers for one work order.
///
/// Every call re-derives the value from persisted state through the
/// backend, so two operators on the same order get non-colliding numbers
/// once one of them has saved. A collision that slips through is caught by
/// the save itself (`Conflict`) and resolved by calling `next()` again.
pub struct SequenceAllocator {
    backend: Arc<dyn FulfillmentBackend>,
    work_order_id: String,
}

impl SequenceAllocator {
    pub fn new(backend: Arc<dyn FulfillmentBackend>, work_order_id: impl Into<String>) -> Self {
        Self {
            backend,
            work_order_id: work_order_id.into(),
        }
    }

    pub async fn next(&self) -> Result<u64, ServiceError> {
        self.backend.next_box_number(&self.work_order_id).await
    }
}
