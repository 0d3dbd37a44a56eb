//! HTTP request handlers (route handlers).
//!
//! Each handler is a thin async adapter: extract request data, call the
//! service layer, translate the result into JSON. No business rules
//! live here.

/// Admin endpoints: products, key inventory, order management
pub mod admin;
/// Health check endpoint
pub mod health;
/// Public order endpoints: reserve, lookup, demo confirm
pub mod orders;
/// Payment gateway webhook
pub mod payment_webhook;
/// Public product catalog endpoints
pub mod products;
