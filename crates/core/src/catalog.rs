//! Product catalog: articles and their sellable variants.
//!
//! The catalog is static configuration (loaded from YAML by the shop). Stock
//! counts live in the ledger, not here.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::stock::StockKey;
use crate::types::{Cents, CountryId, VariantId};

/// A sellable unit, e.g. "50 € gift card".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    /// Current price in cents. Orders freeze the price at order time.
    pub price: Cents,
    /// Stock is kept per ISO country instead of under the `all` key.
    #[serde(default)]
    pub has_country: bool,
    /// May be ordered beyond current stock and delivered after a restock.
    #[serde(default)]
    pub on_demand: bool,
    /// Staff get a low-stock warning below this count.
    #[serde(default)]
    pub warn_stock: u32,
}

impl Variant {
    /// Whether the variant can be sold for this country ID.
    #[must_use]
    pub fn accepts_country(&self, country_id: &CountryId) -> bool {
        if self.has_country {
            country_id.is_iso_code()
        } else {
            country_id.is_all()
        }
    }

    /// The ledger key for this variant in a country.
    #[must_use]
    pub fn stock_key(&self, country_id: CountryId) -> StockKey {
        StockKey {
            variant_id: self.id.clone(),
            country_id,
        }
    }
}

/// A product with one or more variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub brand: String,
    pub name: String,
    /// Hidden from the portfolio unless in stock or on demand.
    #[serde(default)]
    pub hide: bool,
    pub variants: Vec<Variant>,
}

/// The whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub articles: Vec<Article>,
}

/// A catalog that cannot be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate variant id: {0}")]
    DuplicateVariant(VariantId),
    #[error("variant {0} has a negative price")]
    NegativePrice(VariantId),
}

impl Catalog {
    /// Look up a variant by ID.
    #[must_use]
    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants().find(|variant| &variant.id == id)
    }

    /// All variants in catalog order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.articles
            .iter()
            .flat_map(|article| article.variants.iter())
    }

    /// Check catalog invariants.
    ///
    /// # Errors
    ///
    /// Returns the first duplicate variant ID or negative price found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for variant in self.variants() {
            if !seen.insert(&variant.id) {
                return Err(CatalogError::DuplicateVariant(variant.id.clone()));
            }
            if variant.price < Cents::ZERO {
                return Err(CatalogError::NegativePrice(variant.id.clone()));
            }
        }
        Ok(())
    }
}
