//! Business logic services.
//!
//! # Services
//!
//! - `fulfilment` - Purchase lifecycle and stock allocation
//! - `cleanup` - Periodic replenishment and cleanup sweeps
//! - `catalog` - Catalog loading from YAML
//! - `notify` - Customer notifications over email and ntfy
//! - `email` - Email delivery via SMTP
//! - `ntfy` - ntfy.sh push client
//! - `clock` - Injectable date source
//! - `ids` - Purchase ID and key generation

pub mod catalog;
pub mod cleanup;
pub mod clock;
pub mod email;
pub mod fulfilment;
pub mod ids;
pub mod notify;
pub mod ntfy;

pub use catalog::{CatalogLoadError, load_catalog, parse_catalog};
pub use cleanup::{run_maintenance, spawn_cleanup_task};
pub use clock::{Clock, FixedClock, SystemClock};
pub use email::{EmailError, EmailService};
pub use fulfilment::{
    EngineError, FulfilmentEngine, OrderRequest, OverviewRow, PaymentOutcome, StockUpload,
    SweepReport,
};
pub use ids::{IdSource, RandomIds};
pub use notify::{NoopNotifier, Notification, NotificationError, NotificationSender, Notifier};
pub use ntfy::{NtfyClient, NtfyError};
