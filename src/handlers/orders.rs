//! Public order handlers.
//!
//! - POST /api/v1/orders - Reserve keys and create an order
//! - GET /api/v1/orders/:order_no/:token - Order view via capability token
//! - POST /api/v1/orders/lookup - Exact-match search by number or contact
//! - POST /api/v1/orders/:order_no/:token/confirm - Demo payment confirm
//!
//! The access token in the URL is the only authorization for order
//! access; there are no customer accounts.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    models::order::{LookupRequest, OrderStatus, OrderView, PaymentOutcome, ReserveRequest},
    services::order_service,
};

/// Place an order: reserve keys now, pay within the reservation window.
///
/// # Request Body
///
/// ```json
/// {
///   "product_id": 1,
///   "qty": 2,
///   "customer_contact": "buyer@example.com"
/// }
/// ```
///
/// # Response (201)
///
/// Order number and access token; the token is shown once here and in
/// the order URL, nowhere else.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reservation =
        order_service::reserve(&state.pool, state.config.reserve_minutes, request).await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Fetch one order with items and any delivered codes.
pub async fn get_order(
    State(state): State<AppState>,
    Path((order_no, token)): Path<(String, String)>,
) -> Result<Json<OrderView>, AppError> {
    let view =
        order_service::lookup_by_token(&state.pool, &state.cipher, &order_no, &token).await?;

    Ok(Json(view))
}

/// Search orders by exact order number or exact contact string.
pub async fn lookup_orders(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    if request.order_no.as_deref().unwrap_or("").trim().is_empty()
        && request
            .customer_contact
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
    {
        return Err(AppError::Validation(
            "provide an order number or a contact".to_string(),
        ));
    }

    let views =
        order_service::lookup_by_contact_or_number(&state.pool, &state.cipher, &request).await?;

    Ok(Json(views))
}

/// Demo payment confirmation, standing in for a real gateway redirect.
///
/// Token-gated and only valid while the order is still `pending`; the
/// expiry decision itself belongs to the order service.
pub async fn demo_confirm(
    State(state): State<AppState>,
    Path((order_no, token)): Path<(String, String)>,
) -> Result<Json<PaymentOutcome>, AppError> {
    let view =
        order_service::lookup_by_token(&state.pool, &state.cipher, &order_no, &token).await?;

    if view.order.status != OrderStatus::Pending {
        return Err(AppError::Validation(
            "order is not pending, nothing to pay".to_string(),
        ));
    }

    let outcome =
        order_service::confirm_payment_and_deliver(&state.pool, &order_no, false).await?;

    Ok(Json(outcome))
}
