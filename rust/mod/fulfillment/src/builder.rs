use logistics_core::{normalize_text, ServiceError};

use crate::catalog::Catalog;
use crate::model::{BoxItem, PackedBox, SaveBoxRequest, SerialEntry};
use crate::serial::CapturedItem;

/// Whether saving creates a new box number or overwrites a saved box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    New,
    Replace,
}

/// A line in the box being built. `id` is local to the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub id: u32,
    pub brand: String,
    pub model: String,
    pub product_type: String,
    pub quantity: u32,
    pub serials: Vec<SerialEntry>,
}

impl LineItem {
    /// Quantity was raised after capture; more serials are needed.
    pub fn needs_recapture(&self) -> bool {
        (self.serials.len() as u32) < self.quantity
    }
}

/// Edits to an unsaved line. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineItemChanges {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub product_type: Option<String>,
    pub quantity: Option<u32>,
}

/// Assembles one box in memory until it is saved.
#[derive(Debug, Clone)]
pub struct BoxBuilder {
    number: u64,
    mode: BuildMode,
    seal: Option<String>,
    sku: Option<String>,
    items: Vec<LineItem>,
    next_item_id: u32,
}

impl BoxBuilder {
    /// Open an empty box at a freshly allocated number.
    pub fn start(number: u64) -> Self {
        Self {
            number,
            mode: BuildMode::New,
            seal: None,
            sku: None,
            items: Vec::new(),
            next_item_id: 1,
        }
    }

    /// Load a saved box for editing; the save overwrites it.
    pub fn from_saved(saved: &PackedBox) -> Self {
        let mut builder = Self::start(saved.box_number);
        builder.mode = BuildMode::Replace;
        builder.seal = normalize_text(Some(&saved.seal));
        builder.sku = saved.sku.clone();
        for item in &saved.items {
            builder.push(CapturedItem {
                brand: item.brand.clone(),
                model: item.model.clone(),
                product_type: item.product_type.clone(),
                serials: item.serials.clone(),
            });
        }
        builder
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn seal(&self) -> Option<&str> {
        self.seal.as_deref()
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn item(&self, id: u32) -> Result<&LineItem, ServiceError> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("line item {id}")))
    }

    /// Move a new box to another number after a collision.
    pub fn renumber(&mut self, number: u64) -> Result<(), ServiceError> {
        if self.mode == BuildMode::Replace {
            return Err(ServiceError::Precondition(format!(
                "box {} is already saved and keeps its number",
                self.number
            )));
        }
        self.number = number;
        Ok(())
    }

    pub fn set_seal(&mut self, value: &str) {
        self.seal = normalize_text(Some(value));
    }

    pub fn set_sku(&mut self, value: &str) {
        self.sku = normalize_text(Some(value));
    }

    pub fn add_line_item(&mut self, item: CapturedItem, catalog: &Catalog) -> Result<u32, ServiceError> {
        catalog.validate(&item.brand, &item.model, &item.product_type)?;
        if item.serials.is_empty() {
            return Err(ServiceError::Validation("line item has no serials".into()));
        }
        Ok(self.push(item))
    }

    /// Replace the serials (and references) of an existing line after re-capture.
    pub fn replace_line_item(
        &mut self,
        id: u32,
        item: CapturedItem,
        catalog: &Catalog,
    ) -> Result<(), ServiceError> {
        catalog.validate(&item.brand, &item.model, &item.product_type)?;
        let line = self.item_mut(id)?;
        line.quantity = item.quantity();
        line.brand = item.brand;
        line.model = item.model;
        line.product_type = item.product_type;
        line.serials = item.serials;
        Ok(())
    }

    pub fn remove_line_item(&mut self, id: u32) -> Result<LineItem, ServiceError> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("line item {id}")))?;
        Ok(self.items.remove(pos))
    }

    /// Apply edits to an unsaved line.
    ///
    /// Shrinking the quantity truncates the serials; growing it keeps them
    /// and leaves the line needing re-capture.
    pub fn edit_line_item(
        &mut self,
        id: u32,
        changes: LineItemChanges,
        catalog: &Catalog,
    ) -> Result<(), ServiceError> {
        if changes.quantity == Some(0) {
            return Err(ServiceError::Validation("quantity must be greater than zero".into()));
        }

        let current = self.item(id)?;
        let brand = changes.brand.unwrap_or_else(|| current.brand.clone());
        let model = changes.model.unwrap_or_else(|| current.model.clone());
        let product_type = changes.product_type.unwrap_or_else(|| current.product_type.clone());
        catalog.validate(&brand, &model, &product_type)?;

        let line = self.item_mut(id)?;
        line.brand = brand;
        line.model = model;
        line.product_type = product_type;
        if let Some(quantity) = changes.quantity {
            line.quantity = quantity;
            line.serials.truncate(quantity as usize);
        }
        Ok(())
    }

    /// Check the box is complete and build the save request.
    pub fn to_request(&self) -> Result<SaveBoxRequest, ServiceError> {
        let Some(seal) = self.seal.clone() else {
            return Err(ServiceError::Validation("security seal is required".into()));
        };
        if self.items.is_empty() {
            return Err(ServiceError::Validation(format!("box {} has no items", self.number)));
        }
        for line in &self.items {
            let captured = line.serials.len() as u32;
            if line.quantity == 0 || captured != line.quantity {
                return Err(ServiceError::Validation(format!(
                    "line {} ({} {}) has {} of {} serials",
                    line.id, line.brand, line.model, captured, line.quantity
                )));
            }
        }

        Ok(SaveBoxRequest {
            box_number: self.number,
            seal,
            sku: self.sku.clone(),
            items: self
                .items
                .iter()
                .map(|l| BoxItem {
                    brand: l.brand.clone(),
                    model: l.model.clone(),
                    product_type: l.product_type.clone(),
                    serials: l.serials.clone(),
                })
                .collect(),
            replace: self.mode == BuildMode::Replace,
        })
    }

    fn push(&mut self, item: CapturedItem) -> u32 {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.items.push(LineItem {
            id,
            quantity: item.quantity(),
            brand: item.brand,
            model: item.model,
            product_type: item.product_type,
            serials: item.serials,
        });
        id
    }

    fn item_mut(&mut self, id: u32) -> Result<&mut LineItem, ServiceError> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("line item {id}")))
    }
}
