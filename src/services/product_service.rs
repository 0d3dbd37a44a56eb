//! Product catalog service.
//!
//! The order engine only ever reads products; the write operations here
//! exist for the admin surface. Price edits never touch existing orders
//! because the unit price is snapshotted into `order_items` at
//! reservation time.

use crate::{
    db::DbPool,
    error::AppError,
    models::product::{Product, ProductRequest, ProductWithStock},
};

/// List active products with their available key counts, newest first.
pub async fn list_active(pool: &DbPool) -> Result<Vec<ProductWithStock>, AppError> {
    let products: Vec<ProductWithStock> = sqlx::query_as(
        r#"
        SELECT p.*,
            COALESCE((
                SELECT COUNT(*) FROM card_keys ck
                WHERE ck.product_id = p.id AND ck.status = 'available'
            ), 0)::bigint AS available_count
        FROM products p
        WHERE p.is_active = TRUE
        ORDER BY p.id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(products)
}

/// Fetch one active product with its available count.
pub async fn get_active(pool: &DbPool, product_id: i64) -> Result<ProductWithStock, AppError> {
    let product: Option<ProductWithStock> = sqlx::query_as(
        r#"
        SELECT p.*,
            COALESCE((
                SELECT COUNT(*) FROM card_keys ck
                WHERE ck.product_id = p.id AND ck.status = 'available'
            ), 0)::bigint AS available_count
        FROM products p
        WHERE p.id = $1 AND p.is_active = TRUE
        "#,
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    product.ok_or(AppError::ProductUnavailable)
}

/// Create a product.
pub async fn create(pool: &DbPool, request: &ProductRequest) -> Result<Product, AppError> {
    validate(request)?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (name, description, price_cents, is_active)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(request.description.as_deref().map(str::trim))
    .bind(request.price_cents)
    .bind(request.is_active)
    .fetch_one(pool)
    .await?;

    Ok(product)
}

/// Update a product in place. Existing orders keep their snapshotted price.
pub async fn update(
    pool: &DbPool,
    product_id: i64,
    request: &ProductRequest,
) -> Result<Product, AppError> {
    validate(request)?;

    let product: Option<Product> = sqlx::query_as(
        r#"
        UPDATE products
        SET name = $2, description = $3, price_cents = $4, is_active = $5,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(product_id)
    .bind(request.name.trim())
    .bind(request.description.as_deref().map(str::trim))
    .bind(request.price_cents)
    .bind(request.is_active)
    .fetch_optional(pool)
    .await?;

    product.ok_or(AppError::NotFound)
}

fn validate(request: &ProductRequest) -> Result<(), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if request.price_cents < 0 {
        return Err(AppError::Validation(
            "price must not be negative".to_string(),
        ));
    }
    Ok(())
}
