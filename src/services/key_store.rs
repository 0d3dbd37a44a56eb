//! Key store - durable, encrypted, deduplicated card key records.
//!
//! Pure data layer: no order or reservation logic lives here. Codes are
//! encrypted before they touch the database and fingerprinted so imports
//! can skip duplicates without decrypting existing rows.

use crate::{
    crypto::{self, CodeCipher},
    db::DbPool,
    error::AppError,
    models::card_key::{CardKey, ImportReport, InventoryStats, KeyStatus, KeyView},
};

/// Bulk-import plaintext codes for a product.
///
/// # Process
///
/// 1. Verify the product exists
/// 2. Per code: compute the SHA-256 fingerprint and the AES-256-GCM payload
/// 3. Insert with `ON CONFLICT (product_id, code_sha256) DO NOTHING`
/// 4. Count conflicts as skipped, not as errors
///
/// Import is bulk and best-effort per line; the same code imported for a
/// different product inserts normally. The whole batch runs in one
/// transaction, so a failure midway leaves nothing behind.
///
/// # Errors
///
/// - `NotFound`: product does not exist
/// - `Database`: query failure
pub async fn import_keys(
    pool: &DbPool,
    cipher: &CodeCipher,
    product_id: i64,
    codes: &[String],
) -> Result<ImportReport, AppError> {
    let product_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(pool)
            .await?;
    if !product_exists {
        return Err(AppError::NotFound);
    }

    let mut tx = pool.begin().await?;

    let mut inserted = 0u64;
    let mut skipped = 0u64;

    for code in codes {
        let code_sha256 = crypto::fingerprint(code);
        let code_encrypted = cipher.encrypt(code)?;

        let affected = sqlx::query(
            r#"
            INSERT INTO card_keys (product_id, code_encrypted, code_sha256, status)
            VALUES ($1, $2, $3, 'available')
            ON CONFLICT (product_id, code_sha256) DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(&code_encrypted)
        .bind(&code_sha256)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 1 {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    tx.commit().await?;

    Ok(ImportReport { inserted, skipped })
}

/// Decrypt the plaintext code of one key.
///
/// # Errors
///
/// - `NotFound`: no such key
/// - `CorruptCiphertext`: the stored payload cannot be decrypted; the row
///   exists but its contents cannot be trusted
pub async fn reveal_key(pool: &DbPool, cipher: &CodeCipher, key_id: i64) -> Result<String, AppError> {
    let payload: String = sqlx::query_scalar("SELECT code_encrypted FROM card_keys WHERE id = $1")
        .bind(key_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    cipher.decrypt(&payload).inspect_err(|_| {
        tracing::error!(key_id, "stored card key payload failed to decrypt");
    })
}

/// Replace the code of a key that has not been reserved or sold.
///
/// Editing a reserved or sold key would rewrite a committed sales record,
/// so anything but `available` fails.
///
/// # Errors
///
/// - `Validation`: empty replacement code, or the new code already exists
///   for this product
/// - `NotFound`: no such key
/// - `NotEditable`: key exists but is reserved or sold
pub async fn edit_key(
    pool: &DbPool,
    cipher: &CodeCipher,
    key_id: i64,
    new_code: &str,
) -> Result<(), AppError> {
    let new_code = new_code.trim();
    if new_code.is_empty() {
        return Err(AppError::Validation("code must not be empty".to_string()));
    }

    let code_sha256 = crypto::fingerprint(new_code);
    let code_encrypted = cipher.encrypt(new_code)?;

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE card_keys
        SET code_encrypted = $1, code_sha256 = $2
        WHERE id = $3 AND status = 'available'
        RETURNING id
        "#,
    )
    .bind(&code_encrypted)
    .bind(&code_sha256)
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            AppError::Validation("code already exists for this product".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    if updated.is_some() {
        return Ok(());
    }

    not_editable_or_missing(pool, key_id).await
}

/// Delete a key that has not been reserved or sold.
///
/// Sold keys are the permanent delivery record and can never be deleted.
pub async fn delete_key(pool: &DbPool, key_id: i64) -> Result<(), AppError> {
    let deleted: Option<i64> =
        sqlx::query_scalar("DELETE FROM card_keys WHERE id = $1 AND status = 'available' RETURNING id")
            .bind(key_id)
            .fetch_optional(pool)
            .await?;

    if deleted.is_some() {
        return Ok(());
    }

    not_editable_or_missing(pool, key_id).await
}

/// Distinguish "no such key" from "key exists but is locked into an order".
async fn not_editable_or_missing(pool: &DbPool, key_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM card_keys WHERE id = $1)")
        .bind(key_id)
        .fetch_one(pool)
        .await?;

    if exists {
        Err(AppError::NotEditable)
    } else {
        Err(AppError::NotFound)
    }
}

/// List the keys of a product in one status, decrypted for the admin view.
pub async fn list_keys(
    pool: &DbPool,
    cipher: &CodeCipher,
    product_id: i64,
    status: KeyStatus,
) -> Result<Vec<KeyView>, AppError> {
    let rows: Vec<CardKey> = sqlx::query_as(
        r#"
        SELECT *
        FROM card_keys
        WHERE product_id = $1 AND status = $2
        ORDER BY id DESC
        "#,
    )
    .bind(product_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let code = cipher.decrypt(&row.code_encrypted).inspect_err(|_| {
            tracing::error!(key_id = row.id, "stored card key payload failed to decrypt");
        })?;
        views.push(KeyView {
            id: row.id,
            product_id: row.product_id,
            code,
            status: row.status,
            sold_at: row.sold_at,
            created_at: row.created_at,
        });
    }

    Ok(views)
}

/// Inventory counts by status for one product.
pub async fn inventory_stats(pool: &DbPool, product_id: i64) -> Result<InventoryStats, AppError> {
    let stats: InventoryStats = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN status = 'available' THEN 1 ELSE 0 END), 0)::bigint AS available,
            COALESCE(SUM(CASE WHEN status = 'reserved'  THEN 1 ELSE 0 END), 0)::bigint AS reserved,
            COALESCE(SUM(CASE WHEN status = 'sold'      THEN 1 ELSE 0 END), 0)::bigint AS sold
        FROM card_keys
        WHERE product_id = $1
        "#,
    )
    .bind(product_id)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
