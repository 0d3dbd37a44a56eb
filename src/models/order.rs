//! Order data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an order.
///
/// Transitions: `pending -> {paid, expired, canceled}`,
/// `paid -> {delivered, delivery_failed}`, and `expired -> paid` for
/// forced payment confirmation only. `delivered` and `canceled` are
/// terminal; `delivery_failed` is terminal for the engine and requires
/// manual remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Delivered,
    DeliveryFailed,
    Expired,
    Canceled,
}

/// Represents an order record from the database.
///
/// # Database Table
///
/// Maps to the `orders` table. `order_no` and `access_token` are
/// independent 18-digit numeric strings; the token is the bearer
/// capability for customer-less order access. Order rows are never
/// deleted; after creation only the status lifecycle fields mutate.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: i64,

    /// Public order number, unique, time-prefixed
    pub order_no: String,

    /// Bearer capability for order lookup without login
    pub access_token: String,

    pub customer_contact: String,

    pub customer_note: Option<String>,

    pub status: OrderStatus,

    /// Snapshot total in cents, immune to later price edits
    pub total_cents: i64,

    /// Deadline of the key reservation backing this order
    pub reserved_expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub paid_at: Option<DateTime<Utc>>,

    pub delivered_at: Option<DateTime<Utc>>,
}

/// An order line joined with its product name.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderItemView {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub qty: i32,
    /// Unit price at order time, in cents
    pub unit_price_cents: i64,
}

/// Request body for placing an order.
///
/// # JSON Example
///
/// ```json
/// {
///   "product_id": 1,
///   "qty": 2,
///   "customer_contact": "buyer@example.com",
///   "customer_note": "please hurry"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub product_id: i64,

    /// Purchase quantity, 1 to 100
    pub qty: i32,

    pub customer_contact: String,

    pub customer_note: Option<String>,
}

/// Response for a successful reservation.
#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub order_no: String,
    pub access_token: String,
    pub reserved_expires_at: DateTime<Utc>,
    pub total_cents: i64,
}

/// Customer-facing view of one order: the row, its lines and the
/// decrypted codes of every sold key.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub items: Vec<OrderItemView>,
    pub delivered_codes: Vec<String>,
}

/// Result of a payment confirmation attempt.
///
/// `delivery_failed` travels here as a value, never as an error: the
/// money arrived, the goods did not, and a human has to resolve it.
#[derive(Debug, Serialize)]
pub struct PaymentOutcome {
    pub status: OrderStatus,
    pub message: String,
}

/// Request body for public order lookup. Exact match only.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub order_no: Option<String>,

    #[serde(default)]
    pub customer_contact: Option<String>,
}

/// Admin order listing row: the order plus its summed quantity.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct AdminOrderSummary {
    pub id: i64,
    pub order_no: String,
    pub customer_contact: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub total_qty: Option<i64>,
    pub reserved_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A reserved key row in the admin order detail.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct ReservedKeyView {
    pub id: i64,
    pub product_id: i64,
    pub reserved_until: Option<DateTime<Utc>>,
}

/// Admin view of one order: lines, still-reserved keys and the
/// plaintext of delivered codes.
#[derive(Debug, Serialize)]
pub struct AdminOrderDetail {
    pub order: Order,
    pub items: Vec<OrderItemView>,
    pub reserved_keys: Vec<ReservedKeyView>,
    pub sold_codes: Vec<String>,
}
