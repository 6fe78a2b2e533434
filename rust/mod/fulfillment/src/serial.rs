use logistics_core::{normalize_text, ServiceError};

use crate::catalog::Catalog;
use crate::model::SerialEntry;

/// A line item whose serials have all been captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedItem {
    pub brand: String,
    pub model: String,
    pub product_type: String,
    pub serials: Vec<SerialEntry>,
}

impl CapturedItem {
    pub fn quantity(&self) -> u32 {
        self.serials.len() as u32
    }
}

/// Collects exactly `target` distinct serials for one line item.
///
/// Nothing is persisted while a session is open; dropping it has no
/// side effects.
#[derive(Debug, Clone)]
pub struct SerialCaptureSession {
    brand: String,
    model: String,
    product_type: String,
    target: u32,
    captured: Vec<SerialEntry>,
    draft: String,
    /// Builder line being re-captured, if any.
    recapture_of: Option<u32>,
}

impl SerialCaptureSession {
    pub fn start(
        brand: &str,
        model: &str,
        product_type: &str,
        quantity: u32,
    ) -> Result<Self, ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::Validation("quantity must be greater than zero".into()));
        }
        let field = |name: &str, value: &str| {
            normalize_text(Some(value))
                .ok_or_else(|| ServiceError::Validation(format!("{name} is required")))
        };
        Ok(Self {
            brand: field("brand", brand)?,
            model: field("model", model)?,
            product_type: field("product type", product_type)?,
            target: quantity,
            captured: Vec::new(),
            draft: String::new(),
            recapture_of: None,
        })
    }

    /// Resume capture for an existing builder line, keeping its serials.
    pub fn resume(
        line_id: u32,
        brand: &str,
        model: &str,
        product_type: &str,
        quantity: u32,
        serials: Vec<SerialEntry>,
    ) -> Result<Self, ServiceError> {
        let mut session = Self::start(brand, model, product_type, quantity)?;
        session.captured = serials;
        session.captured.truncate(quantity as usize);
        session.recapture_of = Some(line_id);
        Ok(session)
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn captured(&self) -> &[SerialEntry] {
        &self.captured
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn recapture_of(&self) -> Option<u32> {
        self.recapture_of
    }

    pub fn remaining(&self) -> u32 {
        self.target - self.captured.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.captured.len() as u32 == self.target
    }

    pub fn set_draft(&mut self, text: &str) {
        self.draft = text.to_string();
    }

    /// Submit the draft buffer as a serial; the buffer clears on success.
    pub fn commit_draft(&mut self, color: Option<&str>) -> Result<(), ServiceError> {
        let draft = std::mem::take(&mut self.draft);
        match self.add_serial(&draft, color) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.draft = draft;
                Err(e)
            }
        }
    }

    pub fn add_serial(&mut self, value: &str, color: Option<&str>) -> Result<(), ServiceError> {
        let Some(serial) = normalize_text(Some(value)) else {
            return Err(ServiceError::Validation("serial number is empty".into()));
        };
        if self.is_complete() {
            return Err(ServiceError::Validation(format!(
                "all {} serials already captured",
                self.target
            )));
        }
        if self.captured.iter().any(|s| s.serial == serial) {
            return Err(ServiceError::Validation(format!("duplicate serial: {serial}")));
        }
        self.captured.push(SerialEntry::with_color(serial, color));
        Ok(())
    }

    pub fn remove_serial(&mut self, index: usize) -> Result<SerialEntry, ServiceError> {
        if index >= self.captured.len() {
            return Err(ServiceError::Validation(format!("no serial at position {index}")));
        }
        Ok(self.captured.remove(index))
    }

    /// Close the session and emit the completed line item.
    ///
    /// Only valid once every serial is captured; the references are
    /// re-checked against the catalog snapshot.
    pub fn finalize(self, catalog: &Catalog) -> Result<CapturedItem, ServiceError> {
        if !self.is_complete() {
            return Err(ServiceError::Validation(format!(
                "captured {} of {} serials",
                self.captured.len(),
                self.target
            )));
        }
        catalog.validate(&self.brand, &self.model, &self.product_type)?;
        Ok(CapturedItem {
            brand: self.brand,
            model: self.model,
            product_type: self.product_type,
            serials: self.captured,
        })
    }
}
