//! BTCPay Server.
//!
//! Invoices carry the purchase ID as `orderId` and the payment key in their
//! metadata. Webhooks are signed with `BTCPay-Sig: sha256=<hex>`, an
//! HMAC-SHA256 of the raw body keyed with the webhook secret.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, instrument};
use url::Url;

use voucher_store_core::{PaymentEvent, PaymentKey, Purchase, PurchaseId};

use super::{PaymentError, PaymentMethod, PaymentNotice};
use crate::config::BtcPayConfig;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "btcpay-sig";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    invoice_id: Option<String>,
    metadata: Option<InvoiceMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceMetadata {
    order_id: Option<String>,
    payment_key: Option<String>,
}

/// BTCPay Server invoices.
pub struct BtcPay {
    webhook_secret: SecretString,
    invoice_url: Url,
}

impl std::fmt::Debug for BtcPay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtcPay")
            .field("webhook_secret", &"[REDACTED]")
            .field("invoice_url", &self.invoice_url.as_str())
            .finish()
    }
}

impl BtcPay {
    #[must_use]
    pub fn new(config: &BtcPayConfig) -> Self {
        Self {
            webhook_secret: config.webhook_secret.clone(),
            invoice_url: config.invoice_url.clone(),
        }
    }

    /// Check the `BTCPay-Sig` header against the body.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::MissingSignature` or
    /// `PaymentError::InvalidSignature`.
    #[instrument(skip_all)]
    pub fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), PaymentError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(PaymentError::MissingSignature)?;
        let signature = header
            .strip_prefix("sha256=")
            .ok_or(PaymentError::InvalidSignature)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
            .map_err(|_| PaymentError::InvalidSignature)?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !constant_time_compare(&expected, &signature.to_ascii_lowercase()) {
            return Err(PaymentError::InvalidSignature);
        }

        debug!("BTCPay signature verified");
        Ok(())
    }
}

fn event_for(event_type: &str) -> Option<PaymentEvent> {
    match event_type {
        "InvoiceProcessing" => Some(PaymentEvent::Processing),
        "InvoiceSettled" => Some(PaymentEvent::Settled),
        "InvoiceExpired" | "InvoiceInvalid" => Some(PaymentEvent::Expired),
        _ => None,
    }
}

impl PaymentMethod for BtcPay {
    fn id(&self) -> &'static str {
        "btcpay"
    }

    fn handle_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<PaymentNotice>, PaymentError> {
        self.verify_signature(headers, body)?;

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

        let Some(event) = event_for(&payload.event_type) else {
            debug!(
                event_type = %payload.event_type,
                invoice_id = payload.invoice_id.as_deref().unwrap_or(""),
                "Ignoring BTCPay event"
            );
            return Ok(None);
        };

        let metadata = payload
            .metadata
            .ok_or_else(|| PaymentError::InvalidPayload("missing invoice metadata".to_string()))?;
        let order_id = metadata
            .order_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::InvalidPayload("missing orderId".to_string()))?;
        let payment_key = metadata
            .payment_key
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::InvalidPayload("missing paymentKey".to_string()))?;

        Ok(Some(PaymentNotice {
            purchase_id: PurchaseId::new(order_id),
            payment_key: PaymentKey::new(payment_key),
            event,
        }))
    }

    fn create_invoice_link(&self, purchase: &Purchase) -> Option<Url> {
        let mut url = self.invoice_url.clone();
        url.query_pairs_mut()
            .append_pair("orderId", purchase.id.as_str())
            .append_pair("paymentKey", purchase.payment_key.as_str())
            .append_pair("price", &purchase.sum().to_decimal().to_string())
            .append_pair("currency", "EUR");
        Some(url)
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn btcpay() -> BtcPay {
        BtcPay::new(&BtcPayConfig {
            webhook_secret: SecretString::from("whsec-test"),
            invoice_url: Url::parse("https://pay.example.com/api/v1/invoices?storeId=S1").unwrap(),
        })
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec-test").unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers
    }

    const SETTLED: &[u8] = br#"{"type":"InvoiceSettled","invoiceId":"inv1","metadata":{"orderId":"ABC234","paymentKey":"pk123"}}"#;

    #[test]
    fn test_settled_webhook() {
        let notice = btcpay()
            .handle_webhook(&signed(SETTLED), SETTLED)
            .unwrap()
            .unwrap();
        assert_eq!(notice.purchase_id, PurchaseId::new("ABC234"));
        assert_eq!(notice.payment_key, PaymentKey::new("pk123"));
        assert_eq!(notice.event, PaymentEvent::Settled);
    }

    #[test]
    fn test_forged_webhook() {
        let headers = signed(b"other body");
        assert!(matches!(
            btcpay().handle_webhook(&headers, SETTLED),
            Err(PaymentError::InvalidSignature)
        ));
        assert!(matches!(
            btcpay().handle_webhook(&HeaderMap::new(), SETTLED),
            Err(PaymentError::MissingSignature)
        ));
    }

    #[test]
    fn test_irrelevant_event() {
        let body = br#"{"type":"InvoiceCreated","invoiceId":"inv1"}"#;
        assert!(btcpay().handle_webhook(&signed(body), body).unwrap().is_none());
    }

    #[test]
    fn test_missing_metadata() {
        let body = br#"{"type":"InvoiceExpired","invoiceId":"inv1"}"#;
        assert!(matches!(
            btcpay().handle_webhook(&signed(body), body),
            Err(PaymentError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(event_for("InvoiceProcessing"), Some(PaymentEvent::Processing));
        assert_eq!(event_for("InvoiceInvalid"), Some(PaymentEvent::Expired));
        assert_eq!(event_for("InvoiceReceivedPayment"), None);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }
}
