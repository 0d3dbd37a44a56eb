//! Product data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident;

/// Represents a product record from the database.
///
/// # Database Table
///
/// Maps to the `products` table. Prices are stored as `i64` minor
/// currency units (cents) to avoid floating-point precision issues.
/// The order engine reads products for the price snapshot and the
/// active check; it never mutates them.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Product {
    /// Unique identifier for this product
    pub id: i64,

    /// Display name
    pub name: String,

    /// Optional long description
    pub description: Option<String>,

    /// Unit price in cents
    pub price_cents: i64,

    /// Inactive products are hidden from the shop and cannot be ordered
    pub is_active: bool,

    /// Timestamp when the product was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last edit
    pub updated_at: DateTime<Utc>,
}

/// A product joined with its current available key count.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductWithStock {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub is_active: bool,
    pub available_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or updating a product.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,

    pub description: Option<String>,

    /// Unit price in cents
    pub price_cents: i64,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Response body for product endpoints.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// Price formatted with two decimals, e.g. "10.50"
    pub price: String,
    pub is_active: bool,
    /// Keys currently available for purchase
    pub available_count: i64,
}

impl From<ProductWithStock> for ProductResponse {
    fn from(p: ProductWithStock) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price: ident::format_money(p.price_cents),
            price_cents: p.price_cents,
            is_active: p.is_active,
            available_count: p.available_count,
        }
    }
}
