//! One-time upgrade of purchases stored before per-country stock.
//!
//! Old rows keep `ordered` and `delivered` in an earlier JSON shape
//! (`article-id`, `amount`, a bare `id` holding the code) and may lack a
//! country. The runtime rejects such rows; `vs-cli migrate-legacy` rewrites
//! them with the helpers here.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::delivery::{DeliveredItem, Delivery};
use crate::order::{Order, OrderRow};
use crate::stock::StockPayload;
use crate::types::{Cents, CountryId, VariantId};

/// Errors while reading a legacy blob.
#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid image data: {0}")]
    Image(#[from] base64::DecodeError),

    #[error("invalid delivery date {0:?}")]
    Date(String),
}

/// Which country an item without one belongs to.
#[derive(Debug, Clone)]
pub struct LegacyCountryMap {
    overrides: HashMap<VariantId, CountryId>,
    default: CountryId,
}

impl Default for LegacyCountryMap {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            default: CountryId::all(),
        }
    }
}

impl LegacyCountryMap {
    /// Map `variant` to `country` instead of the default.
    #[must_use]
    pub fn with(mut self, variant: impl Into<VariantId>, country: impl Into<CountryId>) -> Self {
        self.overrides.insert(variant.into(), country.into());
        self
    }

    /// Parse `variant=COUNTRY` pairs, e.g. from the command line.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first entry without `=`.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        pairs.into_iter().try_fold(Self::default(), |map, pair| {
            let (variant, country) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected variant=COUNTRY, got {pair:?}"))?;
            Ok(map.with(variant.trim(), country.trim()))
        })
    }

    /// The country for a variant.
    #[must_use]
    pub fn country_for(&self, variant: &VariantId) -> CountryId {
        self.overrides
            .get(variant)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn fill(&self, variant: &VariantId, country: CountryId) -> (CountryId, bool) {
        if country.is_empty() {
            (self.country_for(variant), true)
        } else {
            (country, false)
        }
    }
}

/// A converted blob and how many of its entries had to be changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migrated<T> {
    pub value: T,
    pub upgraded: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LegacyOrderRow {
    amount: u32,
    article_id: String,
    #[serde(default)]
    country_id: String,
    item_price: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LegacyDeliveredItem {
    article_id: String,
    #[serde(default)]
    country_id: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    image: Option<String>,
    delivery_date: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyOrderRow {
    Current(OrderRow),
    Legacy(LegacyOrderRow),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyDeliveredItem {
    Current(DeliveredItem),
    Legacy(LegacyDeliveredItem),
}

/// Convert an `ordered` blob of either shape to the current [`Order`].
///
/// # Errors
///
/// Returns `LegacyError::Json` if the blob matches neither shape.
pub fn migrate_order(json: &str, map: &LegacyCountryMap) -> Result<Migrated<Order>, LegacyError> {
    let rows: Vec<AnyOrderRow> = serde_json::from_str(json)?;
    let mut upgraded = 0;
    let rows = rows
        .into_iter()
        .map(|row| {
            let (row, legacy) = match row {
                AnyOrderRow::Current(row) => (row, false),
                AnyOrderRow::Legacy(row) => (
                    OrderRow {
                        variant_id: VariantId::new(row.article_id),
                        country_id: CountryId::new(row.country_id),
                        quantity: row.amount,
                        item_price: Cents::new(row.item_price),
                    },
                    true,
                ),
            };
            let (country_id, filled) = map.fill(&row.variant_id, row.country_id);
            if legacy || filled {
                upgraded += 1;
            }
            OrderRow { country_id, ..row }
        })
        .collect();
    Ok(Migrated {
        value: Order(rows),
        upgraded,
    })
}

/// Convert a `delivered` blob of either shape to the current [`Delivery`].
///
/// # Errors
///
/// Fails on unparsable JSON, image data or delivery dates.
pub fn migrate_delivery(
    json: &str,
    map: &LegacyCountryMap,
) -> Result<Migrated<Delivery>, LegacyError> {
    let items: Vec<AnyDeliveredItem> = serde_json::from_str(json)?;
    let mut upgraded = 0;
    let mut delivery = Vec::with_capacity(items.len());
    for item in items {
        let (item, legacy) = match item {
            AnyDeliveredItem::Current(item) => (item, false),
            AnyDeliveredItem::Legacy(item) => (convert_delivered(item)?, true),
        };
        let (country_id, filled) = map.fill(&item.variant_id, item.country_id);
        if legacy || filled {
            upgraded += 1;
        }
        delivery.push(DeliveredItem { country_id, ..item });
    }
    Ok(Migrated {
        value: Delivery(delivery),
        upgraded,
    })
}

fn convert_delivered(item: LegacyDeliveredItem) -> Result<DeliveredItem, LegacyError> {
    let payload = match item.image.filter(|image| !image.is_empty()) {
        Some(image) => StockPayload::Image(BASE64.decode(image)?),
        None => StockPayload::Code(item.id),
    };
    let delivery_date = NaiveDate::parse_from_str(&item.delivery_date, "%Y-%m-%d")
        .map_err(|_| LegacyError::Date(item.delivery_date.clone()))?;
    Ok(DeliveredItem {
        variant_id: VariantId::new(item.article_id),
        country_id: CountryId::new(item.country_id),
        payload,
        delivery_date,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn map() -> LegacyCountryMap {
        LegacyCountryMap::default().with("mail12", "DE")
    }

    #[test]
    fn test_country_map() {
        assert_eq!(map().country_for(&VariantId::new("mail12")), CountryId::new("DE"));
        assert_eq!(map().country_for(&VariantId::new("gift")), CountryId::all());
    }

    #[test]
    fn test_from_pairs() {
        let map = LegacyCountryMap::from_pairs(["mail12=DE", " mail24 = AT "]).unwrap();
        assert_eq!(map.country_for(&VariantId::new("mail24")), CountryId::new("AT"));
        assert!(LegacyCountryMap::from_pairs(["nonsense"]).is_err());
    }

    #[test]
    fn test_migrate_legacy_delivery() {
        let json = r#"[
            {"article-id":"mail12","country-id":"","id":"CODE-1","image":null,"delivery-date":"2021-02-03"},
            {"article-id":"gift","id":"","image":"AQID","delivery-date":"2021-02-04"}
        ]"#;
        let migrated = migrate_delivery(json, &map()).unwrap();
        assert_eq!(migrated.upgraded, 2);
        let items = &migrated.value.0;
        assert_eq!(items[0].country_id, CountryId::new("DE"));
        assert_eq!(items[0].payload, StockPayload::Code("CODE-1".to_string()));
        assert_eq!(items[1].country_id, CountryId::all());
        assert_eq!(items[1].payload, StockPayload::Image(vec![1, 2, 3]));
        // the result is consistent for settlement
        assert!(migrated.value.quantities().is_ok());
    }

    #[test]
    fn test_current_delivery_untouched() {
        let json = r#"[{"variant-id":"gift","country-id":"all","payload":{"code":"X"},"delivery-date":"2024-01-01"}]"#;
        let migrated = migrate_delivery(json, &map()).unwrap();
        assert_eq!(migrated.upgraded, 0);
    }

    #[test]
    fn test_current_delivery_without_country() {
        let json = r#"[{"variant-id":"mail12","payload":{"code":"X"},"delivery-date":"2024-01-01"}]"#;
        let migrated = migrate_delivery(json, &map()).unwrap();
        assert_eq!(migrated.upgraded, 1);
        assert_eq!(migrated.value.0[0].country_id, CountryId::new("DE"));
    }

    #[test]
    fn test_migrate_legacy_order() {
        let json = r#"[{"amount":2,"article-id":"mail12","country-id":"","item-price":300}]"#;
        let migrated = migrate_order(json, &map()).unwrap();
        assert_eq!(migrated.upgraded, 1);
        assert_eq!(
            migrated.value.0,
            vec![OrderRow {
                variant_id: VariantId::new("mail12"),
                country_id: CountryId::new("DE"),
                quantity: 2,
                item_price: Cents::new(300),
            }]
        );
    }

    #[test]
    fn test_bad_date() {
        let json = r#"[{"article-id":"gift","id":"X","delivery-date":"03.02.2021"}]"#;
        assert!(matches!(
            migrate_delivery(json, &map()),
            Err(LegacyError::Date(_))
        ));
    }
}
