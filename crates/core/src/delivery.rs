//! Delivered items: the append-only record of what a purchase received.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FulfilmentError;
use crate::stock::{StockKey, StockPayload};
use crate::types::{CountryId, VariantId};

/// One unit handed to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeliveredItem {
    pub variant_id: VariantId,
    /// Empty only for rows written before per-country stock existed.
    #[serde(default)]
    pub country_id: CountryId,
    pub payload: StockPayload,
    pub delivery_date: NaiveDate,
}

impl DeliveredItem {
    /// The ledger key the item was withdrawn from.
    ///
    /// # Errors
    ///
    /// Returns `FulfilmentError::MissingCountry` for legacy items without a
    /// country. Those must be upgraded by the legacy migration first.
    pub fn key(&self) -> Result<StockKey, FulfilmentError> {
        if self.country_id.is_empty() {
            return Err(FulfilmentError::MissingCountry {
                variant: self.variant_id.clone(),
            });
        }
        Ok(StockKey {
            variant_id: self.variant_id.clone(),
            country_id: self.country_id.clone(),
        })
    }

    /// `data:` URL for image payloads.
    #[must_use]
    pub fn image_src(&self) -> Option<String> {
        self.payload.image_src()
    }

    /// Delivery date in the customer-facing `DD.MM.YYYY` form.
    #[must_use]
    pub fn delivery_date_display(&self) -> String {
        self.delivery_date.format("%d.%m.%Y").to_string()
    }
}

/// Everything delivered for a purchase, oldest first. Persisted as a JSON
/// array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delivery(pub Vec<DeliveredItem>);

impl Delivery {
    /// Number of delivered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been delivered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a delivered item.
    pub fn push(&mut self, item: DeliveredItem) {
        self.0.push(item);
    }

    /// Delivered quantity per key.
    ///
    /// # Errors
    ///
    /// Fails on the first item without a country.
    pub fn quantities(&self) -> Result<BTreeMap<StockKey, u32>, FulfilmentError> {
        let mut quantities = BTreeMap::new();
        for item in &self.0 {
            let entry = quantities.entry(item.key()?).or_insert(0u32);
            *entry = entry.saturating_add(1);
        }
        Ok(quantities)
    }

    /// Iterate over delivered items.
    pub fn iter(&self) -> impl Iterator<Item = &DeliveredItem> {
        self.0.iter()
    }
}
