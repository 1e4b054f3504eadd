//! Voucher Store Core - domain types and fulfilment logic.
//!
//! This crate is shared by every voucher store component:
//! - `shop` - HTTP service, persistence and the fulfilment engine
//! - `cli` - Command-line tools for migrations, stock and sweeps
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Settlement arithmetic lives here so the
//! Postgres and in-memory stores share one implementation of it.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, statuses and notify targets
//! - [`catalog`] - Articles and variants
//! - [`stock`] - Ledger keys, payloads and counts
//! - [`order`] - Ordered line items and order submission rules
//! - [`delivery`] - Delivered items
//! - [`purchase`] - The purchase aggregate
//! - [`fulfilment`] - Unfulfilled remainder, withdrawals and settlement outcome
//! - [`legacy`] - Upgrade of pre-country purchase data

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod delivery;
pub mod error;
pub mod fulfilment;
pub mod legacy;
pub mod order;
pub mod purchase;
pub mod stock;
pub mod types;

pub use catalog::{Article, Catalog, CatalogError, Variant};
pub use delivery::{DeliveredItem, Delivery};
pub use error::{FulfilmentError, OrderError};
pub use fulfilment::{SettleOutcome, Unfulfilled, UnfulfilledLine, VatEntry};
pub use order::{Order, OrderRow};
pub use purchase::{NewPurchase, Purchase};
pub use stock::{StockCounts, StockItem, StockKey, StockPayload};
pub use types::*;
