//! Stock ledger types: keys, payloads, items and counts.

use std::collections::HashMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Variant;
use crate::types::{CountryId, StockItemId, VariantId};

/// Extra units an on-demand variant may be ordered beyond its current stock.
pub const ON_DEMAND_HEADROOM: u32 = 100;

/// The (variant, country) pair that partitions the ledger into FIFO pools.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StockKey {
    pub variant_id: VariantId,
    pub country_id: CountryId,
}

impl StockKey {
    /// Create a key.
    #[must_use]
    pub fn new(variant_id: impl Into<VariantId>, country_id: impl Into<CountryId>) -> Self {
        Self {
            variant_id: variant_id.into(),
            country_id: country_id.into(),
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variant_id, self.country_id)
    }
}

/// What a customer actually receives: a code or an image of one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockPayload {
    Code(String),
    Image(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl StockPayload {
    /// A loggable form that never reveals a usable code.
    ///
    /// All but the last four characters of a code are replaced by `*`.
    #[must_use]
    pub fn masked(&self) -> String {
        match self {
            Self::Code(code) => mask(code, 4),
            Self::Image(bytes) => format!("[image, {} bytes]", bytes.len()),
        }
    }

    /// The code, if this payload is one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            Self::Image(_) => None,
        }
    }

    /// A `data:` URL for image payloads, ready for an `<img src>`.
    #[must_use]
    pub fn image_src(&self) -> Option<String> {
        match self {
            Self::Code(_) => None,
            Self::Image(bytes) => Some(format!(
                "data:{};base64,{}",
                sniff_image_type(bytes),
                BASE64.encode(bytes)
            )),
        }
    }
}

// Payloads are secrets; keep them out of debug logs.
impl fmt::Debug for StockPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(_) => f.debug_tuple("Code").field(&self.masked()).finish(),
            Self::Image(bytes) => f.debug_tuple("Image").field(&bytes.len()).finish(),
        }
    }
}

/// Replace all but the last `keep` characters with `*`.
#[must_use]
pub fn mask(s: &str, keep: usize) -> String {
    let len = s.chars().count();
    s.chars()
        .enumerate()
        .map(|(i, c)| if i + keep < len { '*' } else { c })
        .collect()
}

fn sniff_image_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

mod base64_bytes {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// One unsold inventory unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    pub id: StockItemId,
    pub key: StockKey,
    pub payload: StockPayload,
    /// Insertion time; withdrawal order is oldest first.
    pub added_at: DateTime<Utc>,
}

/// Current stock quantity per (variant, country).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockCounts(HashMap<StockKey, u32>);

impl StockCounts {
    /// Build counts from `(key, count)` rows. Repeated keys are summed.
    pub fn from_rows(rows: impl IntoIterator<Item = (StockKey, u32)>) -> Self {
        let mut counts = HashMap::new();
        for (key, count) in rows {
            *counts.entry(key).or_insert(0) += count;
        }
        Self(counts)
    }

    /// Quantity in stock for one key.
    #[must_use]
    pub fn get(&self, key: &StockKey) -> u32 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Quantity in stock for a variant across all countries.
    #[must_use]
    pub fn for_variant(&self, variant_id: &VariantId) -> u32 {
        self.0
            .iter()
            .filter(|(key, _)| &key.variant_id == variant_id)
            .map(|(_, count)| count)
            .sum()
    }

    /// Countries with at least one unit of the variant in stock, sorted.
    #[must_use]
    pub fn countries_in_stock(&self, variant_id: &VariantId) -> Vec<CountryId> {
        let mut countries: Vec<CountryId> = self
            .0
            .iter()
            .filter(|(key, count)| &key.variant_id == variant_id && **count > 0)
            .map(|(key, _)| key.country_id.clone())
            .collect();
        countries.sort();
        countries
    }

    /// The most a customer may order of a variant for a country.
    ///
    /// Equals the stock, plus [`ON_DEMAND_HEADROOM`] for on-demand variants so
    /// they can be oversold against a future restock.
    #[must_use]
    pub fn max_orderable(&self, variant: &Variant, country_id: &CountryId) -> u32 {
        let stock = self.get(&variant.stock_key(country_id.clone()));
        if variant.on_demand {
            stock.saturating_add(ON_DEMAND_HEADROOM)
        } else {
            stock
        }
    }

    /// The variant can currently only be ordered for later delivery.
    #[must_use]
    pub fn on_demand_only(&self, variant: &Variant, country_id: &CountryId) -> bool {
        variant.on_demand && self.get(&variant.stock_key(country_id.clone())) == 0
    }

    /// Iterate over all `(key, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, u32)> {
        self.0.iter().map(|(key, count)| (key, *count))
    }

    /// Total number of units in stock.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}
