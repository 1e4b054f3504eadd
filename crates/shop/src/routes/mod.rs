//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                   - Liveness check
//! GET  /health/ready                             - Readiness check (store reachable)
//!
//! # Payment providers
//! POST /webhooks/{method}                        - Provider callback (e.g. btcpay)
//!
//! # Purchases (JSON)
//! POST /api/purchases                            - Submit an order
//! GET  /api/purchases/{id}/{access_key}          - Purchase page data
//! PUT  /api/purchases/{id}/{access_key}/notify   - Set or clear notify target
//! PUT  /api/purchases/{id}/{access_key}/country  - Change tax country while unpaid
//! ```

pub mod health;
pub mod purchases;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the complete router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(webhooks::router())
        .merge(purchases::router())
}
