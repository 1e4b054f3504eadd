//! Customer-facing purchase API.
//!
//! The access key in the path is the customer's only credential; a wrong key
//! is indistinguishable from a missing purchase.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use voucher_store_core::{
    AccessKey, CountryId, DeliveredItem, Notify, OrderRow, Purchase, PurchaseId, PurchaseStatus,
    StockKey,
};

use crate::error::AppError;
use crate::services::{EngineError, OrderRequest};
use crate::state::AppState;

/// Create purchase routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/purchases", post(create_purchase))
        .route("/api/purchases/{id}/{access_key}", get(show_purchase))
        .route("/api/purchases/{id}/{access_key}/notify", put(update_notify))
        .route("/api/purchases/{id}/{access_key}/country", put(update_country))
}

// =============================================================================
// Request and response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub variant: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub quantity: u32,
}

fn default_country() -> String {
    CountryId::all().into_inner()
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInput {
    pub items: Vec<OrderItemInput>,
    pub country_code: String,
    #[serde(default)]
    pub notify_proto: Option<String>,
    #[serde(default)]
    pub notify_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyInput {
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub addr: String,
}

#[derive(Debug, Deserialize)]
pub struct CountryInput {
    pub country_code: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveredView {
    pub variant_id: String,
    pub country_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_src: Option<String>,
    pub delivery_date: NaiveDate,
}

impl From<&DeliveredItem> for DeliveredView {
    fn from(item: &DeliveredItem) -> Self {
        Self {
            variant_id: item.variant_id.to_string(),
            country_id: item.country_id.to_string(),
            code: item.payload.code().map(str::to_string),
            image_src: item.image_src(),
            delivery_date: item.delivery_date,
        }
    }
}

/// What the customer sees of a purchase.
#[derive(Debug, Serialize)]
pub struct PurchaseView {
    pub id: String,
    pub status: PurchaseStatus,
    pub country_code: String,
    pub country_editable: bool,
    pub sum_cents: i64,
    pub ordered: Vec<OrderRow>,
    pub delivered: Vec<DeliveredView>,
    pub notify: Option<String>,
    pub create_date: NaiveDate,
    pub delete_date: Option<NaiveDate>,
    /// Checkout link per payment method, while unpaid.
    pub payment_links: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedPurchase {
    pub id: String,
    pub access_key: String,
    #[serde(flatten)]
    pub view: PurchaseView,
}

fn purchase_view(state: &AppState, purchase: &Purchase) -> PurchaseView {
    let payment_links = if purchase.status.is_unpaid() {
        let methods = state.payment_methods();
        methods
            .ids()
            .filter_map(|id| {
                let link = methods.get(id)?.create_invoice_link(purchase)?;
                Some((id, link.to_string()))
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    PurchaseView {
        id: purchase.id.to_string(),
        status: purchase.status,
        country_code: purchase.country_code.to_string(),
        country_editable: purchase.country_editable(),
        sum_cents: purchase.sum().as_i64(),
        ordered: purchase.ordered.iter().cloned().collect(),
        delivered: purchase.delivered.iter().map(DeliveredView::from).collect(),
        notify: purchase.notify.as_ref().map(|n| n.proto.to_string()),
        create_date: purchase.create_date,
        delete_date: purchase.delete_date,
        payment_links,
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[instrument(skip(state, input))]
async fn create_purchase(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseInput>,
) -> Result<(StatusCode, Json<CreatedPurchase>), AppError> {
    let notify = Notify::parse(
        input.notify_proto.as_deref(),
        input.notify_addr.as_deref().unwrap_or_default(),
    )
    .map_err(EngineError::from)?;

    let items = input
        .items
        .into_iter()
        .map(|item| (StockKey::new(item.variant, item.country), item.quantity))
        .collect();

    let purchase = state
        .engine()
        .insert_purchase(OrderRequest {
            items,
            country_code: CountryId::new(input.country_code),
            notify,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedPurchase {
            id: purchase.id.to_string(),
            access_key: purchase.access_key.as_str().to_string(),
            view: purchase_view(&state, &purchase),
        }),
    ))
}

#[instrument(skip(state, access_key))]
async fn show_purchase(
    State(state): State<AppState>,
    Path((id, access_key)): Path<(String, String)>,
) -> Result<Json<PurchaseView>, AppError> {
    let purchase = state
        .engine()
        .purchase(&PurchaseId::new(id), &AccessKey::new(access_key))
        .await?;
    Ok(Json(purchase_view(&state, &purchase)))
}

#[instrument(skip(state, access_key, input))]
async fn update_notify(
    State(state): State<AppState>,
    Path((id, access_key)): Path<(String, String)>,
    Json(input): Json<NotifyInput>,
) -> Result<StatusCode, AppError> {
    state
        .engine()
        .set_notify(
            &PurchaseId::new(id),
            &AccessKey::new(access_key),
            input.proto.as_deref(),
            &input.addr,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, access_key, input))]
async fn update_country(
    State(state): State<AppState>,
    Path((id, access_key)): Path<(String, String)>,
    Json(input): Json<CountryInput>,
) -> Result<StatusCode, AppError> {
    let purchase = state
        .engine()
        .purchase(&PurchaseId::new(id), &AccessKey::new(access_key))
        .await?;
    state
        .engine()
        .set_country(&purchase.id, &CountryId::new(input.country_code))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
