//! Orders: the immutable line items of a purchase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::OrderError;
use crate::stock::{StockCounts, StockKey};
use crate::types::{Cents, CountryId, VariantId};

/// Hard upper bound on a single line's quantity.
pub const MAX_QUANTITY: u32 = 100_000;

/// One ordered line, with the price frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderRow {
    pub variant_id: VariantId,
    pub country_id: CountryId,
    pub quantity: u32,
    pub item_price: Cents,
}

impl OrderRow {
    /// The ledger key this line draws from.
    #[must_use]
    pub fn key(&self) -> StockKey {
        StockKey {
            variant_id: self.variant_id.clone(),
            country_id: self.country_id.clone(),
        }
    }

    /// Price of the whole line.
    #[must_use]
    pub fn sum(&self) -> Cents {
        self.item_price.times(self.quantity)
    }
}

/// The ordered line items of a purchase. Persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Order(pub Vec<OrderRow>);

impl Order {
    /// Build an order from customer input.
    ///
    /// Unknown variants are ignored. Quantities are clamped to what may be
    /// ordered right now (see [`StockCounts::max_orderable`]) and to
    /// [`MAX_QUANTITY`]; lines that end up at zero are dropped. Prices are
    /// taken from the catalog.
    ///
    /// # Errors
    ///
    /// - `OrderError::CountryNotAvailable` if a country is requested that the
    ///   variant is not sold for.
    /// - `OrderError::Empty` if nothing orderable remains.
    pub fn from_request(
        catalog: &Catalog,
        stock: &StockCounts,
        requested: impl IntoIterator<Item = (StockKey, u32)>,
    ) -> Result<Self, OrderError> {
        // merge duplicate keys, keep a stable order
        let mut merged: BTreeMap<StockKey, u32> = BTreeMap::new();
        for (key, quantity) in requested {
            let entry = merged.entry(key).or_insert(0);
            *entry = entry.saturating_add(quantity);
        }

        let mut rows = Vec::new();
        for (key, quantity) in merged {
            let Some(variant) = catalog.variant(&key.variant_id) else {
                continue;
            };
            if !variant.accepts_country(&key.country_id) {
                return Err(OrderError::CountryNotAvailable {
                    variant: key.variant_id,
                    country: key.country_id,
                });
            }
            let quantity = quantity
                .min(stock.max_orderable(variant, &key.country_id))
                .min(MAX_QUANTITY);
            if quantity == 0 {
                continue;
            }
            rows.push(OrderRow {
                variant_id: key.variant_id,
                country_id: key.country_id,
                quantity,
                item_price: variant.price,
            });
        }

        if rows.is_empty() {
            return Err(OrderError::Empty);
        }
        Ok(Self(rows))
    }

    /// Total price of the order.
    #[must_use]
    pub fn sum(&self) -> Cents {
        self.0.iter().map(OrderRow::sum).sum()
    }

    /// Whether the order has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ordered quantity per key. Repeated keys are summed.
    #[must_use]
    pub fn quantities(&self) -> BTreeMap<StockKey, u32> {
        let mut quantities = BTreeMap::new();
        for row in &self.0 {
            let entry = quantities.entry(row.key()).or_insert(0u32);
            *entry = entry.saturating_add(row.quantity);
        }
        quantities
    }

    /// Frozen unit price for a key, if ordered.
    #[must_use]
    pub fn item_price(&self, key: &StockKey) -> Option<Cents> {
        self.0
            .iter()
            .find(|row| row.variant_id == key.variant_id && row.country_id == key.country_id)
            .map(|row| row.item_price)
    }

    /// Iterate over the lines.
    pub fn iter(&self) -> impl Iterator<Item = &OrderRow> {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{Article, Variant};

    fn catalog() -> Catalog {
        Catalog {
            articles: vec![Article {
                id: "cards".to_string(),
                brand: "Cards".to_string(),
                name: "Cards".to_string(),
                hide: false,
                variants: vec![
                    Variant {
                        id: VariantId::new("gift-10"),
                        name: "Gift 10".to_string(),
                        price: Cents::new(1000),
                        has_country: false,
                        on_demand: false,
                        warn_stock: 0,
                    },
                    Variant {
                        id: VariantId::new("sim"),
                        name: "SIM".to_string(),
                        price: Cents::new(1500),
                        has_country: true,
                        on_demand: true,
                        warn_stock: 0,
                    },
                ],
            }],
        }
    }

    fn stock() -> StockCounts {
        StockCounts::from_rows([
            (StockKey::new("gift-10", "all"), 5),
            (StockKey::new("sim", "DE"), 5),
        ])
    }

    #[test]
    fn test_quantity_clamped_to_stock() {
        let order = Order::from_request(
            &catalog(),
            &stock(),
            [(StockKey::new("gift-10", "all"), 9)],
        )
        .unwrap();
        assert_eq!(order.0.len(), 1);
        assert_eq!(order.0[0].quantity, 5);
        assert_eq!(order.sum(), Cents::new(5000));
    }

    #[test]
    fn test_on_demand_headroom() {
        let order = Order::from_request(
            &catalog(),
            &stock(),
            [(StockKey::new("sim", "DE"), 500)],
        )
        .unwrap();
        assert_eq!(order.0[0].quantity, 105);
    }

    #[test]
    fn test_unknown_variant_ignored() {
        let order = Order::from_request(
            &catalog(),
            &stock(),
            [
                (StockKey::new("nope", "all"), 1),
                (StockKey::new("gift-10", "all"), 1),
            ],
        )
        .unwrap();
        assert_eq!(order.0.len(), 1);
        assert_eq!(order.0[0].variant_id, VariantId::new("gift-10"));
    }

    #[test]
    fn test_country_must_match_variant() {
        let result = Order::from_request(
            &catalog(),
            &stock(),
            [(StockKey::new("gift-10", "DE"), 1)],
        );
        assert!(matches!(
            result,
            Err(OrderError::CountryNotAvailable { .. })
        ));
    }

    #[test]
    fn test_empty_order_rejected() {
        let result = Order::from_request(
            &catalog(),
            &StockCounts::default(),
            [(StockKey::new("gift-10", "all"), 3)],
        );
        assert_eq!(result, Err(OrderError::Empty));
    }

    #[test]
    fn test_kebab_case_json() {
        let order = Order(vec![OrderRow {
            variant_id: VariantId::new("gift-10"),
            country_id: CountryId::all(),
            quantity: 2,
            item_price: Cents::new(1000),
        }]);
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(
            json,
            r#"[{"variant-id":"gift-10","country-id":"all","quantity":2,"item-price":1000}]"#
        );
    }

    #[test]
    fn test_quantities_merge_repeated_keys() {
        let row = OrderRow {
            variant_id: VariantId::new("gift-10"),
            country_id: CountryId::all(),
            quantity: 2,
            item_price: Cents::new(1000),
        };
        let order = Order(vec![row.clone(), row]);
        assert_eq!(
            order.quantities().get(&StockKey::new("gift-10", "all")),
            Some(&4)
        );
    }
}
