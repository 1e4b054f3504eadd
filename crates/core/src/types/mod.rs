//! Core types for the voucher store.
//!
//! Type-safe wrappers for identifiers, money, statuses and notification
//! targets.

pub mod id;
pub mod money;
pub mod notify;
pub mod status;

pub use id::*;
pub use money::Cents;
pub use notify::{Notify, NotifyError, NotifyProto};
pub use status::*;
