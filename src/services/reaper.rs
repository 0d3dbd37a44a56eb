//! Reservation reaper - periodic reclamation of lapsed reservations.
//!
//! The order service already expires an order the next time anyone
//! touches it; the reaper exists for orders that were abandoned and
//! never revisited, so their keys return to the pool. Best-effort and
//! eventually consistent: a failed sweep is logged and retried on the
//! next tick, never fatal.

use std::time::Duration;

use crate::{db::DbPool, error::AppError};

/// Release every lapsed reservation and expire its order.
///
/// Two independent sweeps, mirroring the lazy path in the order service:
/// keys go back to `available` regardless of order linkage, pending
/// orders past their deadline become `expired`.
pub async fn release_expired(pool: &DbPool) -> Result<(), AppError> {
    let released = sqlx::query(
        r#"
        UPDATE card_keys
        SET status = 'available', order_id = NULL, reserved_until = NULL
        WHERE status = 'reserved' AND reserved_until < NOW()
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    let expired = sqlx::query(
        r#"
        UPDATE orders
        SET status = 'expired', updated_at = NOW()
        WHERE status = 'pending' AND reserved_expires_at < NOW()
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if released > 0 || expired > 0 {
        tracing::info!(released, expired, "reaper reclaimed lapsed reservations");
    }

    Ok(())
}

/// Run the reaper forever: once immediately, then at a fixed interval.
///
/// Spawned as a background task at startup; runs concurrently with live
/// request traffic and synchronizes with it only through the database.
pub async fn run(pool: DbPool, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        // The first tick fires immediately, covering the startup run
        ticker.tick().await;

        if let Err(e) = release_expired(&pool).await {
            tracing::error!("reaper sweep failed: {e}");
        }
    }
}
