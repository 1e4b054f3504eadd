//! Settlement arithmetic: what is still owed, recording withdrawals, and the
//! resulting status.
//!
//! Everything here is pure. The shop runs these steps inside one database
//! transaction:
//!
//! 1. lock the purchase and compute [`Unfulfilled`]
//! 2. withdraw up to `line.quantity` items per line and [`deliver`] them
//! 3. [`conclude`] to set status and delete date
//! 4. persist the purchase and the returned [`VatEntry`]s, then commit

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::delivery::{DeliveredItem, Delivery};
use crate::error::FulfilmentError;
use crate::order::Order;
use crate::purchase::Purchase;
use crate::stock::{StockItem, StockKey};
use crate::types::{Cents, CountryId, PurchaseId, PurchaseStatus, VariantId};

/// Days a finalized (or otherwise settled-on) purchase stays retrievable.
pub const RETENTION_DAYS: u64 = 31;

/// The delete date for a purchase whose retention starts `today`.
#[must_use]
pub fn delete_date_after(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_days(Days::new(RETENTION_DAYS))
        .unwrap_or(NaiveDate::MAX)
}

/// Units of one key that are ordered but not yet delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnfulfilledLine {
    pub key: StockKey,
    pub quantity: u32,
    pub item_price: Cents,
}

/// Ordered minus delivered, one line per key with a positive remainder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Unfulfilled(Vec<UnfulfilledLine>);

impl Unfulfilled {
    /// Compute the remainder.
    ///
    /// # Errors
    ///
    /// Fails if an item has no country, was never ordered, or if more was
    /// delivered than ordered for a key.
    pub fn compute(ordered: &Order, delivered: &Delivery) -> Result<Self, FulfilmentError> {
        let ordered_quantities = ordered.quantities();
        let mut delivered_quantities = delivered.quantities()?;

        for (key, &delivered_count) in &delivered_quantities {
            let Some(&ordered_count) = ordered_quantities.get(key) else {
                return Err(FulfilmentError::NotOrdered { key: key.clone() });
            };
            if delivered_count > ordered_count {
                return Err(FulfilmentError::OverDelivered {
                    key: key.clone(),
                    ordered: ordered_count,
                    delivered: delivered_count,
                });
            }
        }

        let lines = ordered_quantities
            .into_iter()
            .filter_map(|(key, ordered_count)| {
                let delivered_count = delivered_quantities.remove(&key).unwrap_or(0);
                let quantity = ordered_count.saturating_sub(delivered_count);
                (quantity > 0).then(|| UnfulfilledLine {
                    item_price: ordered.item_price(&key).unwrap_or_default(),
                    key,
                    quantity,
                })
            })
            .collect();
        Ok(Self(lines))
    }

    /// Nothing left to deliver.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The lines, sorted by key.
    #[must_use]
    pub fn lines(&self) -> &[UnfulfilledLine] {
        &self.0
    }

    /// Total number of missing units.
    #[must_use]
    pub fn total_units(&self) -> u32 {
        self.0.iter().map(|line| line.quantity).sum()
    }
}

/// Sum unfulfilled quantities across several purchases, per key.
///
/// Used for the staff overview of what restocking would unblock.
#[must_use]
pub fn total_unfulfilled<'a>(
    unfulfilled: impl IntoIterator<Item = &'a Unfulfilled>,
) -> BTreeMap<StockKey, u32> {
    let mut totals = BTreeMap::new();
    for line in unfulfilled.into_iter().flat_map(Unfulfilled::lines) {
        let entry = totals.entry(line.key.clone()).or_insert(0u32);
        *entry = entry.saturating_add(line.quantity);
    }
    totals
}

/// One row of the VAT ledger: a single unit sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VatEntry {
    pub purchase_id: PurchaseId,
    pub delivery_date: NaiveDate,
    pub variant_id: VariantId,
    pub country_id: CountryId,
    pub item_price: Cents,
    /// The purchase's tax country at delivery time.
    pub purchase_country: CountryId,
}

/// Append withdrawn items to the purchase's delivery.
///
/// Returns one VAT entry per delivered unit.
///
/// # Errors
///
/// Fails if more items were withdrawn than the line needs or if an item
/// belongs to a different key. The caller must roll back in that case.
pub fn deliver(
    purchase: &mut Purchase,
    line: &UnfulfilledLine,
    items: Vec<StockItem>,
    today: NaiveDate,
) -> Result<Vec<VatEntry>, FulfilmentError> {
    if items.len() > usize::try_from(line.quantity).unwrap_or(usize::MAX) {
        return Err(FulfilmentError::Overdrawn {
            key: line.key.clone(),
            requested: line.quantity,
            got: items.len(),
        });
    }

    let mut vat = Vec::with_capacity(items.len());
    for item in items {
        if item.key != line.key {
            return Err(FulfilmentError::WrongKey {
                expected: line.key.clone(),
                got: item.key,
            });
        }
        vat.push(VatEntry {
            purchase_id: purchase.id.clone(),
            delivery_date: today,
            variant_id: item.key.variant_id.clone(),
            country_id: item.key.country_id.clone(),
            item_price: line.item_price,
            purchase_country: purchase.country_code.clone(),
        });
        purchase.delivered.push(DeliveredItem {
            variant_id: item.key.variant_id,
            country_id: item.key.country_id,
            payload: item.payload,
            delivery_date: today,
        });
    }
    Ok(vat)
}

/// Result of a settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SettleOutcome {
    /// Nothing was owed; the purchase was not touched.
    Unchanged,
    /// Everything ordered has now been delivered.
    Finalized { delivered: usize },
    /// Some units are still missing and wait for a restock.
    Underdelivered { delivered: usize, missing: u32 },
}

impl SettleOutcome {
    /// Number of units delivered by this settlement.
    #[must_use]
    pub const fn delivered(&self) -> usize {
        match self {
            Self::Unchanged => 0,
            Self::Finalized { delivered } | Self::Underdelivered { delivered, .. } => *delivered,
        }
    }
}

/// Set status and delete date after all withdrawals of a settlement.
///
/// A fully delivered purchase becomes `finalized` and is kept for
/// [`RETENTION_DAYS`]; anything else becomes `underdelivered` with no delete
/// date so that it is never swept while goods are owed.
///
/// # Errors
///
/// Propagates inconsistencies found while recomputing the remainder.
pub fn conclude(
    purchase: &mut Purchase,
    delivered: usize,
    today: NaiveDate,
) -> Result<SettleOutcome, FulfilmentError> {
    let remaining = purchase.unfulfilled()?;
    if remaining.is_empty() {
        purchase.status = PurchaseStatus::Finalized;
        purchase.delete_date = Some(delete_date_after(today));
        Ok(SettleOutcome::Finalized { delivered })
    } else {
        purchase.status = PurchaseStatus::Underdelivered;
        purchase.delete_date = None;
        Ok(SettleOutcome::Underdelivered {
            delivered,
            missing: remaining.total_units(),
        })
    }
}
