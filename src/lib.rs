//! Card-key storefront backend.
//!
//! Sells one-time-use digital codes (license keys, gift codes) to
//! anonymous buyers. Orders reserve concrete keys at creation time so
//! concurrent purchases can never oversell a finite inventory; payment
//! confirmation converts reservations into sales and delivers the
//! decrypted codes; a background reaper reclaims reservations that
//! lapse unpaid.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries); the database
//!   transaction is the sole synchronization point
//! - **Key storage**: AES-256-GCM at rest, SHA-256 fingerprint dedup
//! - **Customer access**: unguessable per-order capability tokens, no accounts

use std::sync::Arc;

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ident;
pub mod middleware;
pub mod models;
pub mod services;

use crate::{config::Config, crypto::CodeCipher, db::DbPool};

/// Shared application state injected into every handler.
///
/// The pool is the injected store handle every component receives
/// explicitly; nothing in the process holds authoritative mutable state
/// of its own.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cipher: CodeCipher,
    pub config: Arc<Config>,
}
