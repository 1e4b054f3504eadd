//! Payment provider callbacks.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::services::EngineError;
use crate::state::AppState;

/// Create webhook routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/{method}", post(handle_webhook))
}

/// Handle a payment provider webhook.
///
/// An event that no longer applies to the purchase (e.g. `expired` after
/// settlement) is logged and acknowledged so the provider stops retrying.
#[instrument(skip(state, headers, body), fields(method = %method))]
async fn handle_webhook(
    State(state): State<AppState>,
    Path(method): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let payment = state
        .payment_methods()
        .get(&method)
        .ok_or_else(|| AppError::NotFound(format!("unknown payment method: {method}")))?;

    let Some(notice) = payment.handle_webhook(&headers, &body)? else {
        debug!("Webhook carries no payment event");
        return Ok(StatusCode::OK);
    };

    match state.engine().handle_payment_event(&notice).await {
        Ok(outcome) => {
            info!(purchase_id = %notice.purchase_id, ?outcome, "Payment event applied");
            Ok(StatusCode::OK)
        }
        Err(EngineError::Transition { id, source }) => {
            warn!(purchase_id = %id, error = %source, "Ignoring payment event");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    use voucher_store_core::{CountryId, PurchaseStatus, StockKey, StockPayload};

    use super::*;
    use crate::db::{MemoryStore, PurchaseRepository, StockLedger};
    use crate::routes::test_support::{self, WEBHOOK_SECRET};
    use crate::services::OrderRequest;

    fn btcpay_request(body: String) -> Request<Body> {
        let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        Request::post("/webhooks/btcpay")
            .header("BTCPay-Sig", sig)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn event(kind: &str, id: &str, payment_key: &str) -> String {
        format!(
            r#"{{"type":"{kind}","invoiceId":"inv","metadata":{{"orderId":"{id}","paymentKey":"{payment_key}"}}}}"#
        )
    }

    #[tokio::test]
    async fn test_settled_webhook_delivers() {
        let store = MemoryStore::new();
        let key = StockKey::new("gift-10", "all");
        store
            .add_item(&key, &StockPayload::Code("CODE-0001".into()))
            .await
            .unwrap();
        let state = test_support::state(&store);
        let purchase = state
            .engine()
            .insert_purchase(OrderRequest {
                items: vec![(key, 1)],
                country_code: CountryId::new("DE"),
                notify: None,
            })
            .await
            .unwrap();

        let body = event(
            "InvoiceSettled",
            purchase.id.as_str(),
            purchase.payment_key.as_str(),
        );
        let response = router()
            .with_state(state.clone())
            .oneshot(btcpay_request(body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = store.purchase_by_id(&purchase.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Finalized);
        assert_eq!(stored.delivered.len(), 1);

        // redelivery is acknowledged and changes nothing
        let response = router()
            .with_state(state)
            .oneshot(btcpay_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.vat_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_late_expiry_is_acknowledged() {
        let store = MemoryStore::new();
        let key = StockKey::new("gift-10", "all");
        store
            .add_item(&key, &StockPayload::Code("CODE-0001".into()))
            .await
            .unwrap();
        let state = test_support::state(&store);
        let purchase = state
            .engine()
            .insert_purchase(OrderRequest {
                items: vec![(key, 1)],
                country_code: CountryId::new("DE"),
                notify: None,
            })
            .await
            .unwrap();
        state.engine().confirm_payment(&purchase.id).await.unwrap();

        let body = event(
            "InvoiceExpired",
            purchase.id.as_str(),
            purchase.payment_key.as_str(),
        );
        let response = router()
            .with_state(state)
            .oneshot(btcpay_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = store.purchase_by_id(&purchase.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Finalized);
    }

    #[tokio::test]
    async fn test_unknown_purchase() {
        let store = MemoryStore::new();
        let body = event("InvoiceSettled", "NOPE23", "wrong");
        let response = router()
            .with_state(test_support::state(&store))
            .oneshot(btcpay_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejected() {
        let store = MemoryStore::new();
        let request = Request::post("/webhooks/btcpay")
            .body(Body::from(event("InvoiceSettled", "ABC234", "pk")))
            .unwrap();
        let response = router()
            .with_state(test_support::state(&store))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let store = MemoryStore::new();
        let request = Request::post("/webhooks/paypal")
            .body(Body::empty())
            .unwrap();
        let response = router()
            .with_state(test_support::state(&store))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
