//! Admin API handlers.
//!
//! Everything here sits behind the admin bearer-key middleware:
//! - Product management (create, update)
//! - Key inventory (bulk import, list, reveal, edit, delete, stats)
//! - Order management (list, detail, forced confirm, cancel)

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    error::AppError,
    models::{
        card_key::{
            EditKeyRequest, ImportKeysRequest, ImportReport, InventoryStats, KeyStatus, KeyView,
        },
        order::{AdminOrderDetail, AdminOrderSummary, OrderStatus, PaymentOutcome},
        product::{Product, ProductRequest},
    },
    services::{key_store, order_service, product_service},
};

// ---- Products ----

/// Create a product.
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let product = product_service::create(&state.pool, &request).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// Update a product. Existing orders keep their snapshotted prices.
pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<Product>, AppError> {
    let product = product_service::update(&state.pool, product_id, &request).await?;

    Ok(Json(product))
}

// ---- Key inventory ----

/// Bulk-import card keys for a product.
///
/// Lines are trimmed, blanks dropped and in-batch duplicates removed
/// before the store sees them; duplicates already in the database are
/// counted as skipped by the store itself.
pub async fn import_keys(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Json(request): Json<ImportKeysRequest>,
) -> Result<Json<ImportReport>, AppError> {
    let mut seen = HashSet::new();
    let codes: Vec<String> = request
        .codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.to_string()))
        .map(String::from)
        .collect();

    if codes.is_empty() {
        return Err(AppError::Validation("no codes supplied".to_string()));
    }

    let report = key_store::import_keys(&state.pool, &state.cipher, product_id, &codes).await?;

    tracing::info!(
        product_id,
        inserted = report.inserted,
        skipped = report.skipped,
        "card keys imported"
    );

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct KeyListParams {
    #[serde(default = "default_key_status")]
    pub status: KeyStatus,
}

fn default_key_status() -> KeyStatus {
    KeyStatus::Available
}

/// List a product's keys in one status, decrypted.
pub async fn list_keys(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    Query(params): Query<KeyListParams>,
) -> Result<Json<Vec<KeyView>>, AppError> {
    let keys = key_store::list_keys(&state.pool, &state.cipher, product_id, params.status).await?;

    Ok(Json(keys))
}

/// Reveal the plaintext code of one key.
pub async fn reveal_key(
    State(state): State<AppState>,
    Path(key_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let code = key_store::reveal_key(&state.pool, &state.cipher, key_id).await?;

    Ok(Json(json!({ "id": key_id, "code": code })))
}

/// Replace the code of an available key.
pub async fn edit_key(
    State(state): State<AppState>,
    Path(key_id): Path<i64>,
    Json(request): Json<EditKeyRequest>,
) -> Result<StatusCode, AppError> {
    key_store::edit_key(&state.pool, &state.cipher, key_id, &request.code).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Delete an available key.
pub async fn delete_key(
    State(state): State<AppState>,
    Path(key_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    key_store::delete_key(&state.pool, key_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Inventory counts by status for one product.
pub async fn inventory_stats(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<InventoryStats>, AppError> {
    let stats = key_store::inventory_stats(&state.pool, product_id).await?;

    Ok(Json(stats))
}

// ---- Orders ----

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,

    /// Substring match on order number or contact
    pub q: Option<String>,
}

/// List orders, optionally filtered by status and search string.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Vec<AdminOrderSummary>>, AppError> {
    let orders =
        order_service::admin_list_orders(&state.pool, params.status, params.q.as_deref()).await?;

    Ok(Json(orders))
}

/// Full detail of one order, including delivered plaintext codes.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<AdminOrderDetail>, AppError> {
    let detail = order_service::admin_get_order(&state.pool, &state.cipher, &order_no).await?;

    Ok(Json(detail))
}

/// Force payment confirmation for an order.
///
/// Bypasses the expiry check: an operator confirming payment asserts the
/// money actually arrived. An expired order is revived and topped up
/// from available stock if its reservation was already released.
pub async fn confirm_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<PaymentOutcome>, AppError> {
    let outcome = order_service::confirm_payment_and_deliver(&state.pool, &order_no, true).await?;

    Ok(Json(outcome))
}

/// Cancel an order and release its reserved keys.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<Json<Value>, AppError> {
    order_service::cancel(&state.pool, &order_no).await?;

    Ok(Json(json!({ "ok": true })))
}
