use logistics_core::ServiceError;

use crate::collector::Collector;
use crate::manifest::Manifest;
use crate::model::{FinalizeRequest, PackedBox, WorkOrder};

/// Where an order stands relative to closure.
///
/// ```text
/// OPEN → READY_TO_FINALIZE → CLOSED
///   ↑                          │
///   └────────── reopen ────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationState {
    Open,
    ReadyToFinalize,
    Closed,
}

/// Why finalize was refused. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeBlocker {
    AlreadyClosed,
    NoBoxes,
    NoCollector,
    NoManifest,
    UnsavedBox,
}

impl FinalizeBlocker {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyClosed => "work order is already closed",
            Self::NoBoxes => "no boxes: save at least one box with items",
            Self::NoCollector => "no collector assigned: select a profile, enter details or mark unnamed",
            Self::NoManifest => "manifest number and security seal must be generated and confirmed",
            Self::UnsavedBox => "the current box has unsaved items: save or discard it first",
        }
    }
}

impl std::fmt::Display for FinalizeBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<FinalizeBlocker> for ServiceError {
    fn from(b: FinalizeBlocker) -> Self {
        ServiceError::Precondition(b.message().to_string())
    }
}

/// Inputs to the finalize gate.
pub struct FinalizeCheck<'a> {
    pub order: &'a WorkOrder,
    pub boxes: &'a [PackedBox],
    pub collector: Option<&'a Collector>,
    pub manifest: Option<&'a Manifest>,
    pub builder_has_items: bool,
}

impl FinalizeCheck<'_> {
    /// First unmet precondition, if any.
    pub fn blocker(&self) -> Option<FinalizeBlocker> {
        if self.order.is_closed() {
            return Some(FinalizeBlocker::AlreadyClosed);
        }
        if !self.boxes.iter().any(|b| !b.is_empty()) {
            return Some(FinalizeBlocker::NoBoxes);
        }
        if self.collector.is_none() {
            return Some(FinalizeBlocker::NoCollector);
        }
        if !self.manifest.is_some_and(Manifest::is_ready) {
            return Some(FinalizeBlocker::NoManifest);
        }
        if self.builder_has_items {
            return Some(FinalizeBlocker::UnsavedBox);
        }
        None
    }

    pub fn state(&self) -> FinalizationState {
        match self.blocker() {
            Some(FinalizeBlocker::AlreadyClosed) => FinalizationState::Closed,
            Some(_) => FinalizationState::Open,
            None => FinalizationState::ReadyToFinalize,
        }
    }

    /// Build the closure request, or the first blocker.
    pub fn request(
        &self,
        unnamed_label: &str,
        closed_by: Option<String>,
    ) -> Result<FinalizeRequest, FinalizeBlocker> {
        if let Some(blocker) = self.blocker() {
            return Err(blocker);
        }
        let (Some(collector), Some(manifest)) = (self.collector, self.manifest) else {
            return Err(FinalizeBlocker::NoCollector);
        };

        let filled: Vec<&PackedBox> = self.boxes.iter().filter(|b| !b.is_empty()).collect();
        Ok(FinalizeRequest {
            collector: collector.resolve(unnamed_label),
            box_count: filled.len() as u32,
            unit_count: filled.iter().map(|b| b.units()).sum(),
            manifest_number: manifest.manifest_number.clone(),
            security_seal: manifest.security_seal.clone(),
            notes: manifest.notes.clone(),
            other_details: manifest.other_details.clone(),
            closed_by,
        })
    }
}

/// Closure notes: manifest notes and other details joined by a blank line.
pub fn closure_notes(notes: Option<&str>, other_details: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [notes, other_details]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
