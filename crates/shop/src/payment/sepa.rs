//! Bank transfer.
//!
//! There is no provider callback. Staff check the account and confirm the
//! payment manually (`vs-cli settle <id>`); the purchase ID is the transfer
//! reference.

use axum::http::HeaderMap;
use url::Url;

use voucher_store_core::Purchase;

use super::{PaymentError, PaymentMethod, PaymentNotice};

/// SEPA bank transfer.
#[derive(Debug, Clone)]
pub struct Sepa {
    account: String,
}

impl Sepa {
    /// Bank transfer to `account` (an IBAN).
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    /// The IBAN customers transfer to.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The reference the customer must put on the transfer.
    #[must_use]
    pub fn reference(purchase: &Purchase) -> String {
        purchase.id.to_string()
    }
}

impl PaymentMethod for Sepa {
    fn id(&self) -> &'static str {
        "sepa"
    }

    fn handle_webhook(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<Option<PaymentNotice>, PaymentError> {
        Err(PaymentError::NoWebhook("sepa"))
    }

    fn create_invoice_link(&self, _purchase: &Purchase) -> Option<Url> {
        None
    }
}
