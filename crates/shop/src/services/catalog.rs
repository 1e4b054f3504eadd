//! Loading the catalog from YAML.
//!
//! ```yaml
//! articles:
//!   - id: gift-cards
//!     brand: Example
//!     name: Gift cards
//!     variants:
//!       - id: gift-25
//!         name: Gift card 25 EUR
//!         price: 2500
//!       - id: sim-10
//!         name: Prepaid SIM 10 EUR
//!         price: 1000
//!         has_country: true
//!         on_demand: true
//! ```

use std::path::Path;

use thiserror::Error;
use tracing::{info, instrument};

use voucher_store_core::{Catalog, CatalogError};

/// Errors while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid catalog: {0}")]
    Invalid(#[from] CatalogError),
}

/// Parse and validate a catalog.
///
/// # Errors
///
/// Returns an error for malformed YAML or a catalog that fails validation.
pub fn parse_catalog(yaml: &str) -> Result<Catalog, CatalogLoadError> {
    let catalog: Catalog = serde_yaml::from_str(yaml)?;
    catalog.validate()?;
    Ok(catalog)
}

/// Read, parse and validate the catalog file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
#[instrument(fields(path = %path.display()))]
pub async fn load_catalog(path: &Path) -> Result<Catalog, CatalogLoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let catalog = parse_catalog(&content)?;
    info!(variants = catalog.variants().count(), "Catalog loaded");
    Ok(catalog)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use voucher_store_core::{Cents, VariantId};

    use super::*;

    #[test]
    fn test_parse_catalog() {
        let yaml = r"
articles:
  - id: cards
    brand: Example
    name: Cards
    variants:
      - id: gift-25
        name: Gift card 25
        price: 2500
      - id: sim-10
        name: SIM 10
        price: 1000
        has_country: true
        on_demand: true
";
        let catalog = parse_catalog(yaml).unwrap();
        let sim = catalog.variant(&VariantId::new("sim-10")).unwrap();
        assert!(sim.has_country);
        assert!(sim.on_demand);
        assert_eq!(sim.price, Cents::new(1000));
        assert!(!catalog.variant(&VariantId::new("gift-25")).unwrap().on_demand);
    }

    #[test]
    fn test_duplicate_variant_rejected() {
        let yaml = r"
articles:
  - id: a
    brand: A
    name: A
    variants:
      - { id: x, name: X, price: 100 }
  - id: b
    brand: B
    name: B
    variants:
      - { id: x, name: X again, price: 200 }
";
        assert!(matches!(
            parse_catalog(yaml),
            Err(CatalogLoadError::Invalid(CatalogError::DuplicateVariant(_)))
        ));
    }
}
