//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response types of the JSON API.

/// Card key inventory model
pub mod card_key;
/// Order and order item models
pub mod order;
/// Product catalog model
pub mod product;
