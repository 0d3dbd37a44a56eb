//! HTTP middleware components.

/// Admin API key authentication middleware
pub mod auth;
