//! Card key inventory models and admin API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a card key.
///
/// An `available` key carries no order linkage; `reserved` and `sold`
/// keys always belong to exactly one order. Sold keys are retained
/// permanently as the delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Available,
    Reserved,
    Sold,
}

/// Represents a card key record from the database.
///
/// # Database Table
///
/// Maps to the `card_keys` table. The plaintext code exists only inside
/// `code_encrypted` (AES-256-GCM, see [`crate::crypto`]); `code_sha256`
/// is the dedup fingerprint, unique per product.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CardKey {
    pub id: i64,

    pub product_id: i64,

    /// `nonce.tag.ciphertext`, three base64 segments
    pub code_encrypted: String,

    /// SHA-256 hex of the plaintext code
    pub code_sha256: String,

    pub status: KeyStatus,

    /// Owning order while reserved or sold
    pub order_id: Option<i64>,

    /// Reservation deadline while reserved
    pub reserved_until: Option<DateTime<Utc>>,

    pub sold_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Request body for bulk key import.
///
/// Codes are trimmed and deduplicated by the handler before reaching the
/// store; duplicates already present in the database are skipped, not
/// rejected.
#[derive(Debug, Deserialize)]
pub struct ImportKeysRequest {
    pub codes: Vec<String>,
}

/// Outcome of a bulk import: best-effort per line.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Request body for replacing the code of an available key.
#[derive(Debug, Deserialize)]
pub struct EditKeyRequest {
    pub code: String,
}

/// Admin view of a key with its decrypted plaintext.
#[derive(Debug, Serialize)]
pub struct KeyView {
    pub id: i64,
    pub product_id: i64,
    pub code: String,
    pub status: KeyStatus,
    pub sold_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-product inventory counts by key status.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct InventoryStats {
    pub available: i64,
    pub reserved: i64,
    pub sold: i64,
}
