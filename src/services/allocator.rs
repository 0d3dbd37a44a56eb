//! Inventory allocator - atomic claim and release of card keys.
//!
//! Every function here runs on a `&mut PgConnection` supplied by the
//! caller, so allocation always composes into the caller's transaction:
//! if the surrounding order write rolls back, so does the allocation.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED`: concurrent claims on one
//! product each lock a disjoint set of rows instead of queueing behind
//! each other, so a purchase burst does not serialize, and two in-flight
//! reservations can never select the same key.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::error::AppError;

/// Lock up to `quantity` available keys of a product for this transaction.
///
/// # Process
///
/// 1. Select available rows in id order, skipping rows locked by other
///    in-flight transactions
/// 2. If fewer than `quantity` rows could be locked, fail the whole claim
///
/// There is no partial reservation: the caller must roll back any
/// dependent writes when this returns `InsufficientStock`.
///
/// # Errors
///
/// - `InsufficientStock`: fewer than `quantity` unlocked available rows
/// - `Database`: query failure
pub async fn claim(
    conn: &mut PgConnection,
    product_id: i64,
    quantity: i64,
) -> Result<Vec<i64>, AppError> {
    let key_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM card_keys
        WHERE product_id = $1 AND status = 'available'
        ORDER BY id ASC
        FOR UPDATE SKIP LOCKED
        LIMIT $2
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .fetch_all(&mut *conn)
    .await?;

    if (key_ids.len() as i64) < quantity {
        return Err(AppError::InsufficientStock);
    }

    Ok(key_ids)
}

/// Transition claimed keys to `reserved`, recording owner and deadline.
///
/// Must run in the same transaction as the [`claim`] that produced
/// `key_ids`; the rows are only locked until that transaction ends.
pub async fn bind_to_order(
    conn: &mut PgConnection,
    key_ids: &[i64],
    order_id: i64,
    reserved_until: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE card_keys
        SET status = 'reserved', order_id = $1, reserved_until = $2
        WHERE id = ANY($3)
        "#,
    )
    .bind(order_id)
    .bind(reserved_until)
    .bind(key_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Return every reserved key of an order to the available pool.
///
/// Idempotent: an order with no reserved keys is a no-op. Returns the
/// number of keys released.
pub async fn release(conn: &mut PgConnection, order_id: i64) -> Result<u64, AppError> {
    let released = sqlx::query(
        r#"
        UPDATE card_keys
        SET status = 'available', order_id = NULL, reserved_until = NULL
        WHERE order_id = $1 AND status = 'reserved'
        "#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(released)
}

/// Convert every reserved key of an order to `sold`, stamping the sale time.
///
/// Idempotent for the same reason as [`release`].
pub async fn promote_to_sold(conn: &mut PgConnection, order_id: i64) -> Result<u64, AppError> {
    let promoted = sqlx::query(
        r#"
        UPDATE card_keys
        SET status = 'sold', reserved_until = NULL, sold_at = NOW()
        WHERE order_id = $1 AND status = 'reserved'
        "#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(promoted)
}

/// Claim fresh available keys and mark them sold directly, bound to an order.
///
/// Only used by forced payment confirmation when an expired order's
/// reservation was already released: the shortfall is covered with
/// currently available stock, which deliberately reassigns fresh keys to
/// a stale order. If not enough keys can be locked the whole top-up
/// fails and the caller decides what the order becomes.
pub async fn top_up(
    conn: &mut PgConnection,
    product_id: i64,
    order_id: i64,
    quantity: i64,
) -> Result<Vec<i64>, AppError> {
    let key_ids = claim(&mut *conn, product_id, quantity).await?;

    sqlx::query(
        r#"
        UPDATE card_keys
        SET status = 'sold', order_id = $1, reserved_until = NULL, sold_at = NOW()
        WHERE id = ANY($2)
        "#,
    )
    .bind(order_id)
    .bind(&key_ids)
    .execute(&mut *conn)
    .await?;

    Ok(key_ids)
}
