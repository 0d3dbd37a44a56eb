//! Card-Key Storefront - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Spawn the reservation reaper task
//! 5. Build HTTP router and start serving

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use keyshop::{AppState, config::Config, crypto::CodeCipher, db, handlers, middleware, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState {
        pool: pool.clone(),
        cipher: CodeCipher::from_secret(&config.card_secret),
        config: Arc::new(config.clone()),
    };

    // Reclaim lapsed reservations: once now, then on every tick
    tokio::spawn(services::reaper::run(pool, config.reaper_interval_secs));

    // Admin routes, guarded by the bearer-key middleware
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/products",
            post(handlers::admin::create_product),
        )
        .route(
            "/api/v1/admin/products/{id}",
            put(handlers::admin::update_product),
        )
        .route(
            "/api/v1/admin/products/{id}/keys",
            post(handlers::admin::import_keys).get(handlers::admin::list_keys),
        )
        .route(
            "/api/v1/admin/products/{id}/inventory",
            get(handlers::admin::inventory_stats),
        )
        .route(
            "/api/v1/admin/keys/{id}",
            get(handlers::admin::reveal_key)
                .put(handlers::admin::edit_key)
                .delete(handlers::admin::delete_key),
        )
        .route("/api/v1/admin/orders", get(handlers::admin::list_orders))
        .route(
            "/api/v1/admin/orders/{order_no}",
            get(handlers::admin::get_order),
        )
        .route(
            "/api/v1/admin/orders/{order_no}/confirm",
            post(handlers::admin::confirm_order),
        )
        .route(
            "/api/v1/admin/orders/{order_no}/cancel",
            post(handlers::admin::cancel_order),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    // Combine public routes with the admin group
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Shop catalog
        .route("/api/v1/products", get(handlers::products::list_products))
        .route(
            "/api/v1/products/{id}",
            get(handlers::products::get_product),
        )
        // Orders: reserve, lookup, demo payment
        .route("/api/v1/orders", post(handlers::orders::create_order))
        .route(
            "/api/v1/orders/lookup",
            post(handlers::orders::lookup_orders),
        )
        .route(
            "/api/v1/orders/{order_no}/{token}",
            get(handlers::orders::get_order),
        )
        .route(
            "/api/v1/orders/{order_no}/{token}/confirm",
            post(handlers::orders::demo_confirm),
        )
        // Payment gateway callback
        .route(
            "/api/v1/webhooks/payment",
            post(handlers::payment_webhook::receive),
        )
        .merge(admin_routes)
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    axum::serve(listener, app).await?;

    Ok(())
}
