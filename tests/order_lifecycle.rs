//! End-to-end order lifecycle tests against a real PostgreSQL database.
//!
//! `#[sqlx::test]` provisions an isolated database per test and applies
//! the migrations in `./migrations`. The tests are ignored by default so
//! the suite passes on machines without PostgreSQL; run them with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::collections::HashSet;

use sqlx::PgPool;

use keyshop::{
    crypto::CodeCipher,
    error::AppError,
    models::order::{OrderStatus, ReserveRequest},
    services::{key_store, order_service, reaper},
};

const RESERVE_MINUTES: i64 = 30;

fn cipher() -> CodeCipher {
    CodeCipher::from_secret("integration-test-secret")
}

async fn seed_product(pool: &PgPool, name: &str, price_cents: i64) -> i64 {
    sqlx::query_scalar("INSERT INTO products (name, price_cents) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(price_cents)
        .fetch_one(pool)
        .await
        .expect("seed product")
}

async fn import(pool: &PgPool, product_id: i64, codes: &[&str]) {
    let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    key_store::import_keys(pool, &cipher(), product_id, &codes)
        .await
        .expect("import keys");
}

fn request(product_id: i64, qty: i32) -> ReserveRequest {
    ReserveRequest {
        product_id,
        qty,
        customer_contact: "buyer@example.com".to_string(),
        customer_note: None,
    }
}

async fn key_count(pool: &PgPool, product_id: i64, status: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM card_keys WHERE product_id = $1 AND status = $2")
        .bind(product_id)
        .bind(status)
        .fetch_one(pool)
        .await
        .expect("count keys")
}

async fn order_status(pool: &PgPool, order_no: &str) -> OrderStatus {
    sqlx::query_scalar("SELECT status FROM orders WHERE order_no = $1")
        .bind(order_no)
        .fetch_one(pool)
        .await
        .expect("order status")
}

/// Push an order's reservation deadline into the past.
async fn backdate(pool: &PgPool, order_no: &str) {
    sqlx::query(
        "UPDATE orders SET reserved_expires_at = NOW() - INTERVAL '5 minutes' WHERE order_no = $1",
    )
    .bind(order_no)
    .execute(pool)
    .await
    .expect("backdate order");

    sqlx::query(
        r#"
        UPDATE card_keys SET reserved_until = NOW() - INTERVAL '5 minutes'
        WHERE order_id = (SELECT id FROM orders WHERE order_no = $1)
        "#,
    )
    .bind(order_no)
    .execute(pool)
    .await
    .expect("backdate keys");
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn import_deduplicates_per_product(pool: PgPool) {
    let p1 = seed_product(&pool, "Product One", 1000).await;
    let p2 = seed_product(&pool, "Product Two", 2000).await;

    let codes = vec!["KEY-A".to_string(), "KEY-B".to_string()];
    let first = key_store::import_keys(&pool, &cipher(), p1, &codes)
        .await
        .unwrap();
    assert_eq!((first.inserted, first.skipped), (2, 0));

    // Same product: skipped, not an error
    let again = key_store::import_keys(&pool, &cipher(), p1, &codes[..1])
        .await
        .unwrap();
    assert_eq!((again.inserted, again.skipped), (0, 1));

    // Different product: inserts normally
    let other = key_store::import_keys(&pool, &cipher(), p2, &codes[..1])
        .await
        .unwrap();
    assert_eq!((other.inserted, other.skipped), (1, 0));
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn reveal_round_trips_imported_code(pool: PgPool) {
    let product = seed_product(&pool, "Product", 1000).await;
    import(&pool, product, &["GAME-XYZZY-0042"]).await;

    let key_id: i64 = sqlx::query_scalar("SELECT id FROM card_keys WHERE product_id = $1")
        .bind(product)
        .fetch_one(&pool)
        .await
        .unwrap();

    let code = key_store::reveal_key(&pool, &cipher(), key_id).await.unwrap();
    assert_eq!(code, "GAME-XYZZY-0042");
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn purchase_scenario_reserve_pay_deliver(pool: PgPool) {
    let product = seed_product(&pool, "Gift Card", 990).await;
    import(&pool, product, &["A1", "A2"]).await;

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    assert_eq!(reservation.total_cents, 1980);
    assert_eq!(key_count(&pool, product, "reserved").await, 2);
    assert_eq!(key_count(&pool, product, "available").await, 0);

    let outcome = order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, false)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Delivered);
    assert_eq!(key_count(&pool, product, "sold").await, 2);

    // Lookup through the capability token returns both plaintexts
    let view = order_service::lookup_by_token(
        &pool,
        &cipher(),
        &reservation.order_no,
        &reservation.access_token,
    )
    .await
    .unwrap();
    let codes: HashSet<String> = view.delivered_codes.into_iter().collect();
    assert_eq!(codes, HashSet::from(["A1".to_string(), "A2".to_string()]));

    // Wrong token is indistinguishable from a missing order
    let wrong = order_service::lookup_by_token(&pool, &cipher(), &reservation.order_no, "0")
        .await;
    assert!(matches!(wrong, Err(AppError::NotFound)));

    // Stock is exhausted now
    let next = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 1)).await;
    assert!(matches!(next, Err(AppError::OutOfStock)));
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn delivery_is_idempotent(pool: PgPool) {
    let product = seed_product(&pool, "Product", 500).await;
    import(&pool, product, &["K1", "K2"]).await;

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();

    let first = order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, false)
        .await
        .unwrap();
    let second = order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, false)
        .await
        .unwrap();

    assert_eq!(first.status, OrderStatus::Delivered);
    assert_eq!(second.status, OrderStatus::Delivered);
    // A retried confirmation must not consume more inventory
    assert_eq!(key_count(&pool, product, "sold").await, 2);

    let paid_at: Vec<(Option<chrono::DateTime<chrono::Utc>>,)> =
        sqlx::query_as("SELECT paid_at FROM orders WHERE order_no = $1")
            .bind(&reservation.order_no)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert!(paid_at[0].0.is_some());
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn concurrent_reserves_never_oversell(pool: PgPool) {
    let product = seed_product(&pool, "Hot Product", 100).await;
    import(&pool, product, &["C1", "C2", "C3", "C4", "C5"]).await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..12 {
        let pool = pool.clone();
        tasks.spawn(async move {
            order_service::reserve(&pool, RESERVE_MINUTES, request(product, 1)).await
        });
    }

    let mut reserved = 0;
    let mut rejected = 0;
    while let Some(result) = tasks.join_next().await {
        match result.expect("task panicked") {
            Ok(_) => reserved += 1,
            Err(AppError::OutOfStock) => rejected += 1,
            Err(e) => panic!("unexpected reserve error: {e}"),
        }
    }

    assert_eq!(reserved, 5);
    assert_eq!(rejected, 7);
    assert_eq!(key_count(&pool, product, "reserved").await, 5);
    assert_eq!(key_count(&pool, product, "available").await, 0);
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn reaper_releases_lapsed_reservations(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["R1", "R2"]).await;

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    backdate(&pool, &reservation.order_no).await;

    reaper::release_expired(&pool).await.unwrap();

    assert_eq!(order_status(&pool, &reservation.order_no).await, OrderStatus::Expired);
    assert_eq!(key_count(&pool, product, "available").await, 2);

    // The reclaimed stock is reservable again at full quantity
    order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn late_confirm_expires_lazily(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["L1"]).await;

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 1))
        .await
        .unwrap();
    backdate(&pool, &reservation.order_no).await;

    // No reaper run: the state machine itself notices the lapse
    let outcome = order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, false)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Expired);
    assert_eq!(key_count(&pool, product, "available").await, 1);
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn cancel_releases_stock_but_delivered_cannot_cancel(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["X1", "X2"]).await;

    let first = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    order_service::cancel(&pool, &first.order_no).await.unwrap();
    assert_eq!(key_count(&pool, product, "available").await, 2);

    // Canceling again is a no-op
    order_service::cancel(&pool, &first.order_no).await.unwrap();

    // Paying a canceled order is refused
    let refused = order_service::confirm_payment_and_deliver(&pool, &first.order_no, true).await;
    assert!(matches!(refused, Err(AppError::OrderCanceled)));

    // The released keys are reservable and deliverable again
    let second = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    order_service::confirm_payment_and_deliver(&pool, &second.order_no, false)
        .await
        .unwrap();

    let blocked = order_service::cancel(&pool, &second.order_no).await;
    assert!(matches!(blocked, Err(AppError::AlreadyDelivered)));
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn forced_confirm_revives_expired_order_with_fresh_stock(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["F1", "F2"]).await;

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    backdate(&pool, &reservation.order_no).await;
    reaper::release_expired(&pool).await.unwrap();
    assert_eq!(key_count(&pool, product, "available").await, 2);

    // The operator asserts the money arrived: revive and deliver from
    // whatever is available now
    let outcome = order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, true)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Delivered);
    assert_eq!(key_count(&pool, product, "sold").await, 2);
    assert_eq!(key_count(&pool, product, "available").await, 0);
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn forced_confirm_short_on_stock_is_delivery_failed(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["S1", "S2"]).await;

    let stale = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 2))
        .await
        .unwrap();
    backdate(&pool, &stale.order_no).await;
    reaper::release_expired(&pool).await.unwrap();

    // Another customer takes one of the released keys in the meantime
    order_service::reserve(&pool, RESERVE_MINUTES, request(product, 1))
        .await
        .unwrap();

    let outcome = order_service::confirm_payment_and_deliver(&pool, &stale.order_no, true)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::DeliveryFailed);
    assert_eq!(order_status(&pool, &stale.order_no).await, OrderStatus::DeliveryFailed);
}

#[sqlx::test]
#[ignore = "requires PostgreSQL; run with cargo test -- --ignored"]
async fn sold_keys_are_not_editable(pool: PgPool) {
    let product = seed_product(&pool, "Product", 100).await;
    import(&pool, product, &["E1"]).await;

    let key_id: i64 = sqlx::query_scalar("SELECT id FROM card_keys WHERE product_id = $1")
        .bind(product)
        .fetch_one(&pool)
        .await
        .unwrap();

    // Editable and deletable while available
    key_store::edit_key(&pool, &cipher(), key_id, "E1-FIXED")
        .await
        .unwrap();
    assert_eq!(
        key_store::reveal_key(&pool, &cipher(), key_id).await.unwrap(),
        "E1-FIXED"
    );

    let reservation = order_service::reserve(&pool, RESERVE_MINUTES, request(product, 1))
        .await
        .unwrap();
    order_service::confirm_payment_and_deliver(&pool, &reservation.order_no, false)
        .await
        .unwrap();

    // Sold: the delivery record is immutable
    let edit = key_store::edit_key(&pool, &cipher(), key_id, "E1-AGAIN").await;
    assert!(matches!(edit, Err(AppError::NotEditable)));
    let delete = key_store::delete_key(&pool, key_id).await;
    assert!(matches!(delete, Err(AppError::NotEditable)));

    // A missing key is a plain not-found
    let missing = key_store::delete_key(&pool, key_id + 999).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
}
