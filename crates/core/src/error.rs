//! Domain errors.

use crate::stock::StockKey;
use crate::types::{CountryId, VariantId};

/// A purchase's persisted state does not add up.
///
/// These indicate corrupted or unmigrated data, never a customer mistake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FulfilmentError {
    #[error("delivered item of variant {variant} has no country")]
    MissingCountry { variant: VariantId },

    #[error("delivered {key}, which was never ordered")]
    NotOrdered { key: StockKey },

    #[error("delivered {delivered} of {key} but only {ordered} were ordered")]
    OverDelivered {
        key: StockKey,
        ordered: u32,
        delivered: u32,
    },

    #[error("withdrew {got} of {key} but only {requested} were needed")]
    Overdrawn {
        key: StockKey,
        requested: u32,
        got: usize,
    },

    #[error("withdrew an item of {got} while filling {expected}")]
    WrongKey { expected: StockKey, got: StockKey },
}

/// Customer input that cannot become an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order is empty")]
    Empty,

    #[error("variant {variant} is not available for country {country}")]
    CountryNotAvailable {
        variant: VariantId,
        country: CountryId,
    },

    #[error("invalid tax country: {0}")]
    InvalidTaxCountry(CountryId),
}
