//! Order service - the order lifecycle state machine.
//!
//! This service owns every order transition:
//! - Reservation: order + items + key claim in one transaction
//! - Payment confirmation and delivery, idempotent across retries
//! - Cancellation and lazy expiry, both releasing reserved stock
//! - Customer lookups through the capability token
//!
//! # Atomicity Guarantees
//!
//! `reserve`, `confirm_payment_and_deliver` and `cancel` are each a single
//! PostgreSQL transaction. Concurrent confirm/cancel calls on the same
//! order serialize on a `FOR UPDATE` row lock; the loser observes the
//! committed state and takes the idempotent branch.

use chrono::{Duration, Utc};

use crate::{
    crypto::CodeCipher,
    db::DbPool,
    error::AppError,
    ident,
    models::order::{
        AdminOrderDetail, AdminOrderSummary, LookupRequest, Order, OrderItemView, OrderStatus,
        OrderView, PaymentOutcome, ReserveRequest, ReserveResponse, ReservedKeyView,
    },
    services::allocator,
};

/// How many times identifier generation retries before giving up.
///
/// At 14-digit-timestamp + 4-random-digit cardinality a collision needs
/// two orders in the same clock second drawing the same suffix; the
/// UNIQUE constraint on `orders.order_no` remains the hard backstop.
const ID_GENERATION_ATTEMPTS: u32 = 5;

/// Create an order and reserve its card keys immediately.
///
/// # Process
///
/// 1. Validate quantity bound and contact shape
/// 2. Load the active product and snapshot its unit price
/// 3. Generate a collision-checked order number and an independent token
/// 4. In one transaction: insert order (`pending`) + item, claim keys,
///    bind them with a deadline of now + the configured window
///
/// The public site has no login, so the customer gets a secret access
/// token and uses it in the order URL.
///
/// # Errors
///
/// - `Validation`: quantity outside 1..=100 or contact shorter than 3 chars
/// - `ProductUnavailable`: unknown or inactive product
/// - `OutOfStock`: not enough available keys; nothing is left behind
/// - `CollisionExhausted`: identifier generation kept colliding
pub async fn reserve(
    pool: &DbPool,
    reserve_minutes: i64,
    request: ReserveRequest,
) -> Result<ReserveResponse, AppError> {
    let (contact, note) = validate_reserve_input(
        request.qty,
        &request.customer_contact,
        request.customer_note.as_deref(),
    )?;

    // Load product and snapshot the price
    let product: Option<(i64, bool)> =
        sqlx::query_as("SELECT price_cents, is_active FROM products WHERE id = $1")
            .bind(request.product_id)
            .fetch_optional(pool)
            .await?;

    let Some((unit_price_cents, true)) = product else {
        return Err(AppError::ProductUnavailable);
    };

    let total_cents = unit_price_cents * i64::from(request.qty);

    let order_no = generate_order_no(pool).await?;
    let access_token = generate_access_token(&order_no)?;

    let reserved_expires_at = Utc::now() + Duration::minutes(reserve_minutes);

    let mut tx = pool.begin().await?;

    let order_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO orders
            (order_no, access_token, customer_contact, customer_note, status,
             total_cents, reserved_expires_at)
        VALUES ($1, $2, $3, $4, 'pending', $5, $6)
        RETURNING id
        "#,
    )
    .bind(&order_no)
    .bind(&access_token)
    .bind(&contact)
    .bind(&note)
    .bind(total_cents)
    .bind(reserved_expires_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        // Lost the generation race; the constraint is the real defense
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            AppError::CollisionExhausted
        } else {
            AppError::Database(e)
        }
    })?;

    sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, qty, unit_price_cents)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(request.product_id)
    .bind(request.qty)
    .bind(unit_price_cents)
    .execute(&mut *tx)
    .await?;

    // Reserve keys inside the same transaction
    let key_ids = match allocator::claim(&mut tx, request.product_id, i64::from(request.qty)).await
    {
        Ok(ids) => ids,
        Err(AppError::InsufficientStock) => {
            // Roll back the order row too: no partial reservation
            tx.rollback().await?;
            return Err(AppError::OutOfStock);
        }
        Err(e) => return Err(e),
    };

    allocator::bind_to_order(&mut tx, &key_ids, order_id, reserved_expires_at).await?;

    tx.commit().await?;

    tracing::info!(%order_no, qty = request.qty, "order reserved");

    Ok(ReserveResponse {
        order_no,
        access_token,
        reserved_expires_at,
        total_cents,
    })
}

/// Mark an order as paid and deliver its card keys.
///
/// The single entry point for every payment trigger: demo confirm,
/// gateway webhook and admin override all call this. The caller is
/// responsible for authenticating the trigger.
///
/// # Behavior by current state
///
/// - `delivered`: returned unchanged; a retried webhook must not re-sell keys
/// - `canceled`: fails with `OrderCanceled`
/// - `expired` without `force`: returned unchanged
/// - `pending` past its deadline without `force`: expired on the spot,
///   reservation released
/// - otherwise: stamp paid (first time only), convert reservations to
///   sold, verify per-line sold counts, top up any shortfall, then
///   deliver. A shortfall the top-up cannot cover ends in
///   `delivery_failed`, which is a result, not an error, and is never
///   retried automatically.
///
/// With `force` an expired order re-enters the paid path; if its
/// reservation was already released the shortfall is covered from
/// currently available stock (stock integrity over reservation fairness).
pub async fn confirm_payment_and_deliver(
    pool: &DbPool,
    order_no: &str,
    force: bool,
) -> Result<PaymentOutcome, AppError> {
    let mut tx = pool.begin().await?;

    // Serialize concurrent callers racing on the same order
    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1 FOR UPDATE")
        .bind(order_no)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    match order.status {
        OrderStatus::Delivered => {
            tx.commit().await?;
            return Ok(PaymentOutcome {
                status: OrderStatus::Delivered,
                message: "Order already delivered".to_string(),
            });
        }
        OrderStatus::Canceled => {
            tx.rollback().await?;
            return Err(AppError::OrderCanceled);
        }
        OrderStatus::Expired if !force => {
            tx.commit().await?;
            return Ok(PaymentOutcome {
                status: OrderStatus::Expired,
                message: "Order expired, place a new order".to_string(),
            });
        }
        _ => {}
    }

    let items: Vec<(i64, i32)> =
        sqlx::query_as("SELECT product_id, qty FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .fetch_all(&mut *tx)
            .await?;
    if items.is_empty() {
        return Err(AppError::Internal(format!(
            "order {order_no} has no line items"
        )));
    }

    // Lazy expiry: the deadline passed and nobody forced the payment
    if order.status == OrderStatus::Pending && order.reserved_expires_at < Utc::now() && !force {
        sqlx::query("UPDATE orders SET status = 'expired', updated_at = NOW() WHERE id = $1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;
        allocator::release(&mut tx, order.id).await?;
        tx.commit().await?;

        tracing::info!(order_no, "payment arrived after the deadline, order expired");
        return Ok(PaymentOutcome {
            status: OrderStatus::Expired,
            message: "Reservation lapsed before payment, stock was released".to_string(),
        });
    }

    // Stamp paid; the timestamp survives retries unchanged
    sqlx::query(
        r#"
        UPDATE orders
        SET status = 'paid',
            paid_at = COALESCE(paid_at, NOW()),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .execute(&mut *tx)
    .await?;

    // Convert existing reservations into sales
    allocator::promote_to_sold(&mut tx, order.id).await?;

    // Verify each line is fully covered; only a forced revival of an
    // expired order whose reservation was released can come up short.
    for (product_id, qty) in items {
        let sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM card_keys
            WHERE order_id = $1 AND status = 'sold' AND product_id = $2
            "#,
        )
        .bind(order.id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let missing = i64::from(qty) - sold;
        if missing > 0 {
            match allocator::top_up(&mut tx, product_id, order.id, missing).await {
                Ok(_) => {}
                Err(AppError::InsufficientStock) => {
                    sqlx::query(
                        "UPDATE orders SET status = 'delivery_failed', updated_at = NOW() WHERE id = $1",
                    )
                    .bind(order.id)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;

                    tracing::error!(
                        order_no,
                        product_id,
                        missing,
                        "paid order could not be delivered, manual remediation required"
                    );
                    return Ok(PaymentOutcome {
                        status: OrderStatus::DeliveryFailed,
                        message: "Payment received but stock ran short, contact the merchant"
                            .to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    sqlx::query(
        "UPDATE orders SET status = 'delivered', delivered_at = NOW(), updated_at = NOW() WHERE id = $1",
    )
    .bind(order.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(order_no, "payment confirmed, keys delivered");
    Ok(PaymentOutcome {
        status: OrderStatus::Delivered,
        message: "Payment confirmed, keys delivered".to_string(),
    })
}

/// Cancel an order and release its reservation.
///
/// # Errors
///
/// - `NotFound`: no such order
/// - `AlreadyDelivered`: delivered orders cannot be canceled
///
/// Canceling an already-canceled order is a no-op.
pub async fn cancel(pool: &DbPool, order_no: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1 FOR UPDATE")
        .bind(order_no)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;

    match order.status {
        OrderStatus::Delivered => {
            tx.rollback().await?;
            return Err(AppError::AlreadyDelivered);
        }
        OrderStatus::Canceled => {
            tx.commit().await?;
            return Ok(());
        }
        _ => {}
    }

    sqlx::query("UPDATE orders SET status = 'canceled', updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
    allocator::release(&mut tx, order.id).await?;

    tx.commit().await?;

    tracing::info!(order_no, "order canceled, reservation released");
    Ok(())
}

/// Fetch one order through its capability token.
///
/// The token is the sole authorization; order number and token must both
/// match exactly or the order does not exist as far as the caller knows.
pub async fn lookup_by_token(
    pool: &DbPool,
    cipher: &CodeCipher,
    order_no: &str,
    access_token: &str,
) -> Result<OrderView, AppError> {
    let order: Order =
        sqlx::query_as("SELECT * FROM orders WHERE order_no = $1 AND access_token = $2")
            .bind(order_no)
            .bind(access_token)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound)?;

    build_order_view(pool, cipher, order).await
}

/// Public order search: exact order number or exact contact string.
///
/// No partial or fuzzy matching. Contact search returns the newest 20.
pub async fn lookup_by_contact_or_number(
    pool: &DbPool,
    cipher: &CodeCipher,
    request: &LookupRequest,
) -> Result<Vec<OrderView>, AppError> {
    let order_no = request.order_no.as_deref().unwrap_or("").trim();
    let contact = request.customer_contact.as_deref().unwrap_or("").trim();

    let orders: Vec<Order> = if !order_no.is_empty() {
        sqlx::query_as("SELECT * FROM orders WHERE order_no = $1 LIMIT 1")
            .bind(order_no)
            .fetch_all(pool)
            .await?
    } else if contact.len() >= 3 {
        sqlx::query_as(
            "SELECT * FROM orders WHERE customer_contact = $1 ORDER BY id DESC LIMIT 20",
        )
        .bind(contact)
        .fetch_all(pool)
        .await?
    } else {
        return Ok(Vec::new());
    };

    let mut views = Vec::with_capacity(orders.len());
    for order in orders {
        views.push(build_order_view(pool, cipher, order).await?);
    }
    Ok(views)
}

/// Admin order listing with optional status and search filters.
///
/// The search matches order number or contact, capped at 200 rows.
pub async fn admin_list_orders(
    pool: &DbPool,
    status: Option<OrderStatus>,
    query: Option<&str>,
) -> Result<Vec<AdminOrderSummary>, AppError> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{q}%"));

    let rows: Vec<AdminOrderSummary> = sqlx::query_as(
        r#"
        SELECT o.id, o.order_no, o.customer_contact, o.status, o.total_cents,
               (SELECT SUM(qty) FROM order_items WHERE order_id = o.id)::bigint AS total_qty,
               o.reserved_expires_at, o.created_at
        FROM orders o
        WHERE ($1::text IS NULL OR o.status = $1)
          AND ($2::text IS NULL OR o.order_no ILIKE $2 OR o.customer_contact ILIKE $2)
        ORDER BY o.id DESC
        LIMIT 200
        "#,
    )
    .bind(status)
    .bind(pattern)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Admin view of one order: lines, still-reserved keys, delivered plaintexts.
pub async fn admin_get_order(
    pool: &DbPool,
    cipher: &CodeCipher,
    order_no: &str,
) -> Result<AdminOrderDetail, AppError> {
    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1")
        .bind(order_no)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = fetch_items(pool, order.id).await?;

    let reserved_keys: Vec<ReservedKeyView> = sqlx::query_as(
        r#"
        SELECT id, product_id, reserved_until
        FROM card_keys
        WHERE order_id = $1 AND status = 'reserved'
        ORDER BY id ASC
        "#,
    )
    .bind(order.id)
    .fetch_all(pool)
    .await?;

    let sold_codes = fetch_sold_codes(pool, cipher, order.id).await?;

    Ok(AdminOrderDetail {
        order,
        items,
        reserved_keys,
        sold_codes,
    })
}

async fn build_order_view(
    pool: &DbPool,
    cipher: &CodeCipher,
    order: Order,
) -> Result<OrderView, AppError> {
    let items = fetch_items(pool, order.id).await?;
    let delivered_codes = fetch_sold_codes(pool, cipher, order.id).await?;

    Ok(OrderView {
        order,
        items,
        delivered_codes,
    })
}

async fn fetch_items(pool: &DbPool, order_id: i64) -> Result<Vec<OrderItemView>, AppError> {
    let items: Vec<OrderItemView> = sqlx::query_as(
        r#"
        SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name,
               oi.qty, oi.unit_price_cents
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id = $1
        ORDER BY oi.id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Decrypt every sold key of an order.
///
/// A payload that fails to decrypt aborts the lookup: the row exists and
/// pretending otherwise would hide a data-integrity fault.
async fn fetch_sold_codes(
    pool: &DbPool,
    cipher: &CodeCipher,
    order_id: i64,
) -> Result<Vec<String>, AppError> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT id, code_encrypted
        FROM card_keys
        WHERE order_id = $1 AND status = 'sold'
        ORDER BY id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    let mut codes = Vec::with_capacity(rows.len());
    for (key_id, payload) in rows {
        let code = cipher.decrypt(&payload).inspect_err(|_| {
            tracing::error!(key_id, order_id, "sold card key payload failed to decrypt");
        })?;
        codes.push(code);
    }
    Ok(codes)
}

/// Generate an order number that does not collide with an existing one.
///
/// The EXISTS pre-check keeps the happy path clean; a race that slips
/// through still hits the UNIQUE constraint at insert time.
async fn generate_order_no(pool: &DbPool) -> Result<String, AppError> {
    for _ in 0..ID_GENERATION_ATTEMPTS {
        let candidate = ident::numeric18();
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_no = $1)")
                .bind(&candidate)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Ok(candidate);
        }
    }

    Err(AppError::CollisionExhausted)
}

/// Generate the access token, independent of and distinct from the order number.
fn generate_access_token(order_no: &str) -> Result<String, AppError> {
    for _ in 0..ID_GENERATION_ATTEMPTS {
        let candidate = ident::numeric18();
        if candidate != order_no {
            return Ok(candidate);
        }
    }

    Err(AppError::CollisionExhausted)
}

/// Check the reservation input shape and normalize contact and note.
///
/// Contact and note are trimmed and truncated to 200 and 500 characters;
/// an empty or sub-3-character contact is rejected.
fn validate_reserve_input(
    qty: i32,
    contact: &str,
    note: Option<&str>,
) -> Result<(String, Option<String>), AppError> {
    if !(1..=100).contains(&qty) {
        return Err(AppError::Validation(
            "quantity must be between 1 and 100".to_string(),
        ));
    }

    let contact = contact.trim();
    if contact.chars().count() < 3 {
        return Err(AppError::Validation(
            "contact must be at least 3 characters".to_string(),
        ));
    }
    let contact: String = contact.chars().take(200).collect();

    let note = note
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.chars().take(500).collect());

    Ok((contact, note))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_quantity() {
        for qty in [0, -1, 101] {
            assert!(matches!(
                validate_reserve_input(qty, "someone@example.com", None),
                Err(AppError::Validation(_))
            ));
        }
        assert!(validate_reserve_input(1, "someone@example.com", None).is_ok());
        assert!(validate_reserve_input(100, "someone@example.com", None).is_ok());
    }

    #[test]
    fn rejects_short_contact() {
        assert!(matches!(
            validate_reserve_input(1, "  ab  ", None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn truncates_contact_and_note() {
        let long_contact = "c".repeat(300);
        let long_note = "n".repeat(600);
        let (contact, note) = validate_reserve_input(1, &long_contact, Some(&long_note)).unwrap();
        assert_eq!(contact.chars().count(), 200);
        assert_eq!(note.unwrap().chars().count(), 500);
    }

    #[test]
    fn blank_note_becomes_none() {
        let (_, note) = validate_reserve_input(1, "someone@example.com", Some("   ")).unwrap();
        assert!(note.is_none());
    }

    #[test]
    fn access_token_differs_from_order_no() {
        let token = generate_access_token("200001010000000000").unwrap();
        assert_eq!(token.len(), 18);
        assert_ne!(token, "200001010000000000");
    }
}
