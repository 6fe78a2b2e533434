use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use logistics_core::ServiceError;

use crate::allocator::SequenceAllocator;
use crate::backend::FulfillmentBackend;
use crate::catalog::{Catalog, CatalogKind};
use crate::config::DEFAULT_UNNAMED_LABEL;
use crate::finalize::FinalizeBlocker;
use crate::manifest::{JsonRenderer, ManifestEdits, ManifestRenderer, RenderedManifest, Stamp};
use crate::session::{Effect, Event, FulfillmentSession, SessionSeed};

// ---------------------------------------------------------------------------
// SingleFlight
// ---------------------------------------------------------------------------

/// At most one in-flight operation per key.
///
/// The guard releases its key on drop, including when the owning future
/// is cancelled.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Arc<Mutex<HashSet<String>>>,
}

pub struct FlightGuard {
    inflight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, key: &str) -> Result<FlightGuard, ServiceError> {
        let mut set = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(key.to_string()) {
            return Err(ServiceError::Precondition(format!(
                "operation already in flight for {key}"
            )));
        }
        Ok(FlightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.to_string(),
        })
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(key)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Workbench
// ---------------------------------------------------------------------------

/// Opens controllers against one backend. Controllers opened from the same
/// workbench share the single-flight table.
#[derive(Clone)]
pub struct Workbench {
    backend: Arc<dyn FulfillmentBackend>,
    flights: SingleFlight,
    renderer: Arc<dyn ManifestRenderer>,
    unnamed_label: String,
}

impl Workbench {
    pub fn new(backend: Arc<dyn FulfillmentBackend>) -> Self {
        Self {
            backend,
            flights: SingleFlight::new(),
            renderer: Arc::new(JsonRenderer),
            unnamed_label: DEFAULT_UNNAMED_LABEL.to_string(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ManifestRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_unnamed_label(mut self, label: impl Into<String>) -> Self {
        self.unnamed_label = label.into();
        self
    }

    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    /// Load a work order and everything the session needs, then fetch the
    /// first box number.
    pub async fn open(
        &self,
        work_order_id: &str,
        operator: Option<String>,
    ) -> Result<FulfillmentController, ServiceError> {
        let view = self.backend.boxes(work_order_id).await?;
        let order = view.ticket;
        let collector = self.backend.collector_info(&order.id).await?;
        let directory = self.backend.collectors().await?;
        let manifest = self.backend.manifest(&order.id).await?;
        let catalog = Catalog {
            brands: self.backend.catalog(CatalogKind::Brand).await?,
            models: self.backend.catalog(CatalogKind::Model).await?,
            product_types: self.backend.catalog(CatalogKind::ProductType).await?,
        };

        let session = FulfillmentSession::new(SessionSeed {
            order,
            boxes: view.boxes,
            collector,
            directory,
            manifest,
            catalog,
            unnamed_label: self.unnamed_label.clone(),
        });
        info!(
            work_order = %session.order().readable_id,
            boxes = session.boxes().len(),
            "fulfillment session opened"
        );

        let mut controller = FulfillmentController {
            allocator: SequenceAllocator::new(Arc::clone(&self.backend), session.order().id.clone()),
            backend: Arc::clone(&self.backend),
            flights: self.flights.clone(),
            renderer: Arc::clone(&self.renderer),
            operator,
            rendered: None,
            session,
        };
        let effects = controller.session.open_effects();
        controller.run(effects).await?;
        Ok(controller)
    }
}

// ---------------------------------------------------------------------------
// FulfillmentController
// ---------------------------------------------------------------------------

/// Drives a [`FulfillmentSession`]: feeds it events and runs the effects it
/// asks for against the backend, feeding results back in.
pub struct FulfillmentController {
    backend: Arc<dyn FulfillmentBackend>,
    flights: SingleFlight,
    renderer: Arc<dyn ManifestRenderer>,
    allocator: SequenceAllocator,
    operator: Option<String>,
    session: FulfillmentSession,
    rendered: Option<RenderedManifest>,
}

impl FulfillmentController {
    pub fn session(&self) -> &FulfillmentSession {
        &self.session
    }

    fn flight_key(&self) -> String {
        self.session.order().id.clone()
    }

    /// Apply an operator event and run whatever it triggers.
    pub async fn dispatch(&mut self, event: Event) -> Result<(), ServiceError> {
        let effects = self.session.apply(event)?;
        self.run(effects).await
    }

    /// Ask the allocator again, e.g. after a failed fetch.
    pub async fn refresh_next_number(&mut self) -> Result<u64, ServiceError> {
        let n = self.allocator.next().await?;
        self.session.apply(Event::NextNumber(n))?;
        Ok(n)
    }

    pub async fn save_box(&mut self) -> Result<(), ServiceError> {
        let _flight = self.flights.acquire(&self.flight_key())?;
        self.dispatch(Event::SaveBox).await
    }

    pub async fn delete_box(&mut self, box_number: u64) -> Result<(), ServiceError> {
        self.dispatch(Event::DeleteBox(box_number)).await
    }

    pub async fn generate_manifest(&mut self) -> Result<(), ServiceError> {
        self.dispatch(Event::GenerateManifest(Stamp::now())).await
    }

    pub async fn confirm_manifest(&mut self, edits: ManifestEdits) -> Result<(), ServiceError> {
        self.dispatch(Event::ConfirmManifest(edits)).await
    }

    /// Render the current manifest through the configured renderer.
    pub async fn render_manifest(&mut self) -> Result<RenderedManifest, ServiceError> {
        self.rendered = None;
        self.dispatch(Event::RenderManifest).await?;
        self.rendered
            .take()
            .ok_or_else(|| ServiceError::Internal("renderer produced nothing".into()))
    }

    /// Close the order.
    ///
    /// When only the manifest is missing, a draft is generated and the call
    /// still fails so the operator can review and confirm it first.
    pub async fn finalize(&mut self, closed_by: Option<String>) -> Result<(), ServiceError> {
        let _flight = self.flights.acquire(&self.flight_key())?;
        if self.session.finalize_blocker() == Some(FinalizeBlocker::NoManifest) {
            debug!(work_order = %self.session.order().readable_id, "generating manifest draft before finalize");
            self.dispatch(Event::GenerateManifest(Stamp::now())).await?;
            return Err(FinalizeBlocker::NoManifest.into());
        }
        let closed_by = closed_by.or_else(|| self.operator.clone());
        self.dispatch(Event::Finalize { closed_by }).await
    }

    pub async fn reopen(&mut self) -> Result<(), ServiceError> {
        let _flight = self.flights.acquire(&self.flight_key())?;
        self.dispatch(Event::Reopen).await
    }

    // -----------------------------------------------------------------------
    // Effect loop
    // -----------------------------------------------------------------------

    async fn run(&mut self, effects: Vec<Effect>) -> Result<(), ServiceError> {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            queue.extend(self.execute(effect).await?);
        }
        Ok(())
    }

    async fn execute(&mut self, effect: Effect) -> Result<Vec<Effect>, ServiceError> {
        let id = self.session.order().id.clone();
        match effect {
            Effect::FetchNextBoxNumber => {
                // A failed fetch leaves the number unset; StartBox reports it.
                if let Err(e) = self.refresh_next_number().await {
                    warn!(work_order = %id, error = %e, "next box number fetch failed");
                }
                Ok(vec![])
            }
            Effect::SaveBox(req) => match self.backend.save_box(&id, &req).await {
                Ok(saved) => self.session.apply(Event::BoxSaved(saved)),
                Err(e) => {
                    if e.is_remote() {
                        warn!(work_order = %id, box_number = req.box_number, error = %e, "box save failed");
                    }
                    let follow = self.session.apply(Event::BoxSaveFailed(e.clone()))?;
                    if follow.contains(&Effect::FetchNextBoxNumber) {
                        if let Err(fetch) = self.refresh_next_number().await {
                            warn!(work_order = %id, error = %fetch, "next box number fetch failed");
                        }
                    }
                    Err(e)
                }
            },
            Effect::DeleteBox(number) => match self.backend.delete_box(&id, number).await {
                Ok(()) => self.session.apply(Event::BoxDeleted(number)),
                Err(e) => {
                    warn!(work_order = %id, box_number = number, error = %e, "box delete failed; restored");
                    self.session.apply(Event::BoxDeleteFailed(number))?;
                    Err(e)
                }
            },
            Effect::SaveCollector(info) => match self.backend.save_collector_info(&id, &info).await {
                Ok(_) => self.session.apply(Event::CollectorSaved),
                Err(e) => {
                    warn!(work_order = %id, error = %e, "collector save failed; restored");
                    self.session.apply(Event::CollectorSaveFailed)?;
                    Err(e)
                }
            },
            Effect::SaveManifest(manifest) => match self.backend.save_manifest(&id, &manifest).await {
                Ok(_) => self.session.apply(Event::ManifestSaved),
                Err(e) => {
                    warn!(work_order = %id, error = %e, "manifest save failed; restored");
                    self.session.apply(Event::ManifestSaveFailed)?;
                    Err(e)
                }
            },
            Effect::Finalize(req) => match self.backend.finalize(&id, &req).await {
                Ok(done) => {
                    info!(work_order = %id, units = done.received_units, "work order finalized");
                    self.session.apply(Event::Finalized(done))
                }
                Err(e) => {
                    self.session.apply(Event::FinalizeFailed)?;
                    Err(e)
                }
            },
            Effect::Reopen => {
                let order = self.backend.reopen(&id).await?;
                self.session.apply(Event::Reopened(order))
            }
            Effect::Render(payload) => {
                self.rendered = Some(self.renderer.render(&payload)?);
                Ok(vec![])
            }
        }
    }
}
