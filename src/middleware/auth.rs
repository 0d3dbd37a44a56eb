//! Admin API key authentication middleware.
//!
//! The admin surface (key import, forced payment confirmation, order
//! management) is guarded by a single configured bearer key. Admin
//! identity management beyond that single key lives outside this
//! service.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{AppState, error::AppError};

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from the request
/// 2. Hash the presented key and the configured key with SHA-256
/// 3. Compare the digests; reject with 401 on any mismatch
///
/// Comparing fixed-size digests instead of the raw strings keeps the
/// comparison independent of the presented key's length.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    // Expected format: "Bearer <api_key>"
    let api_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::InvalidApiKey)?;

    let presented = Sha256::digest(api_key.as_bytes());
    let expected = Sha256::digest(state.config.admin_api_key.as_bytes());

    if presented != expected {
        return Err(AppError::InvalidApiKey);
    }

    Ok(next.run(request).await)
}
