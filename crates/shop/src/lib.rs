//! Voucher Store shop library.
//!
//! Everything the `voucher-store` binary and the `vs-cli` tool share:
//! configuration, persistence, the fulfilment engine, payment methods,
//! notifications and the HTTP routes.
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`db`] - Purchase repository and stock ledger (Postgres and in-memory)
//! - [`services`] - Fulfilment engine and its collaborators
//! - [`payment`] - Payment methods and webhook verification
//! - [`routes`] - HTTP handlers
//! - [`state`] - Shared handler state
//! - [`error`] - HTTP error mapping

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod payment;
pub mod routes;
pub mod services;
pub mod state;
