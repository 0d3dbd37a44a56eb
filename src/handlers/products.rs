//! Public product catalog handlers.
//!
//! - GET /api/v1/products - List active products with stock counts
//! - GET /api/v1/products/:id - Get one active product

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState, error::AppError, models::product::ProductResponse,
    services::product_service,
};

/// List active products, newest first, with available key counts.
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = product_service::list_active(&state.pool).await?;

    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Get one active product.
///
/// Returns 404 for unknown or deactivated products; the shop does not
/// distinguish the two.
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = product_service::get_active(&state.pool, product_id).await?;

    Ok(Json(product.into()))
}
