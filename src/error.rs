//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Validation Errors**: Request data with an invalid shape
/// - **Stock Errors**: Recoverable shortages the caller may retry
/// - **Precondition Errors**: Missing rows or rows in a non-editable state
/// - **Terminal-State Conflicts**: Operations against orders that already
///   reached a terminal status
/// - **Integrity Faults**: Stored data that cannot be trusted anymore
///
/// Note that `delivery_failed` is deliberately *not* an error variant. A
/// paid order that could not be delivered is a business outcome carried in
/// [`PaymentOutcome`](crate::models::order::PaymentOutcome) and requires a
/// human, so it must travel the success path of every caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request. The String is safe to surface verbatim.
    #[error("Invalid request")]
    Validation(String),

    /// Referenced product does not exist or is not active.
    #[error("Product not found or inactive")]
    ProductUnavailable,

    /// A reservation could not obtain the requested quantity.
    ///
    /// Recoverable: the caller should retry with a lower quantity or later.
    #[error("Insufficient stock")]
    OutOfStock,

    /// The allocator could not lock enough available key rows.
    ///
    /// Same condition as [`AppError::OutOfStock`] one layer down; the order
    /// state machine maps it into order-lifecycle semantics.
    #[error("Insufficient stock")]
    InsufficientStock,

    /// Requested resource does not exist.
    #[error("Not found")]
    NotFound,

    /// Card key exists but is reserved or sold, so it cannot be edited
    /// or deleted without corrupting the sales record.
    #[error("Card key is not editable")]
    NotEditable,

    /// Payment arrived for an order that was already canceled.
    #[error("Order is canceled")]
    OrderCanceled,

    /// Cancellation requested for an order that was already delivered.
    #[error("Order is already delivered")]
    AlreadyDelivered,

    /// A stored ciphertext could not be decrypted (tag mismatch, wrong key
    /// or malformed payload). Must never be treated as "not found".
    #[error("Stored card key payload is corrupt")]
    CorruptCiphertext,

    /// Order number generation collided on every attempt. Should not occur
    /// in practice; logged for investigation.
    #[error("Identifier generation exhausted retries")]
    CollisionExhausted,

    /// Admin API key is missing or wrong.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Payment webhook signature did not verify.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Invariant violation that is not the caller's fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::ProductUnavailable => (
                StatusCode::NOT_FOUND,
                "product_unavailable",
                self.to_string(),
            ),
            AppError::OutOfStock | AppError::InsufficientStock => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "out_of_stock",
                "Insufficient stock, lower the quantity or retry later".to_string(),
            ),
            AppError::NotEditable => (StatusCode::CONFLICT, "not_editable", self.to_string()),
            AppError::OrderCanceled => (StatusCode::CONFLICT, "order_canceled", self.to_string()),
            AppError::AlreadyDelivered => (
                StatusCode::CONFLICT,
                "already_delivered",
                self.to_string(),
            ),
            // Integrity and infrastructure faults are logged with detail
            // server-side and surfaced opaquely.
            AppError::CorruptCiphertext => {
                tracing::error!("corrupt card key ciphertext surfaced to a request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::CollisionExhausted => {
                tracing::error!("order number generation exhausted retries");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
