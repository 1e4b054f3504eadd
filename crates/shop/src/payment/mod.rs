//! Payment methods.
//!
//! A payment method turns provider callbacks into [`PaymentNotice`]s and
//! tells the customer where to pay. Everything else (status transitions,
//! settlement, notifications) is handled by the fulfilment engine.
//!
//! # Methods
//!
//! - [`btcpay`] - BTCPay Server invoices with signed webhooks
//! - [`sepa`] - Bank transfer, confirmed manually by staff

pub mod btcpay;
pub mod sepa;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use thiserror::Error;
use url::Url;

use voucher_store_core::{PaymentEvent, PaymentKey, Purchase, PurchaseId};

pub use btcpay::BtcPay;
pub use sepa::Sepa;

/// A payment provider's statement about one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub purchase_id: PurchaseId,
    pub payment_key: PaymentKey,
    pub event: PaymentEvent,
}

/// Errors while handling a provider callback.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment method {0} does not accept webhooks")]
    NoWebhook(&'static str),

    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// A way for customers to pay.
pub trait PaymentMethod: Send + Sync {
    /// Stable identifier, used in webhook paths.
    fn id(&self) -> &'static str;

    /// Verify and parse a webhook call.
    ///
    /// Returns `Ok(None)` for authentic events that do not concern the
    /// purchase lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` for unsigned, forged or malformed calls.
    fn handle_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<PaymentNotice>, PaymentError>;

    /// Where the customer pays, if the method has a checkout page.
    fn create_invoice_link(&self, purchase: &Purchase) -> Option<Url>;
}

/// The configured payment methods, by ID.
#[derive(Clone, Default)]
pub struct PaymentMethods {
    methods: BTreeMap<&'static str, Arc<dyn PaymentMethod>>,
}

impl PaymentMethods {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. A method with the same ID is replaced.
    #[must_use]
    pub fn with(mut self, method: impl PaymentMethod + 'static) -> Self {
        self.methods.insert(method.id(), Arc::new(method));
        self
    }

    /// Look up a method.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn PaymentMethod> {
        self.methods.get(id).map(AsRef::as_ref)
    }

    /// IDs of all registered methods.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }
}

impl std::fmt::Debug for PaymentMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        let methods = PaymentMethods::new().with(Sepa::new("DE00 1234"));
        assert!(methods.get("sepa").is_some());
        assert!(methods.get("btcpay").is_none());
        assert_eq!(methods.ids().collect::<Vec<_>>(), vec!["sepa"]);
    }
}
