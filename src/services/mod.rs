//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and complex operations.

pub mod allocator;
pub mod key_store;
pub mod order_service;
pub mod product_service;
pub mod reaper;
