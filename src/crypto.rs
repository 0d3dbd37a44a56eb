//! At-rest encryption for card key codes, dedup fingerprinting and
//! webhook signature verification.
//!
//! Stored payload format: three base64 segments joined by `.` in the order
//! `nonce.tag.ciphertext`, where the nonce is 12 bytes, the tag 16 bytes
//! and the ciphertext is AES-256-GCM over the UTF-8 plaintext. The format
//! must round-trip exactly; rows written by earlier deployments stay
//! readable as long as the deployment secret is unchanged.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Cipher for card key codes (32-byte key for AES-256-GCM).
///
/// The key is derived by hashing the deployment secret, so an arbitrary
/// secret string always yields exactly [`KEY_LEN`] bytes. The dedup
/// fingerprint uses plain SHA-256 of the code, not this key, so duplicate
/// detection never needs to decrypt anything.
#[derive(Clone)]
pub struct CodeCipher {
    key: [u8; KEY_LEN],
}

impl Drop for CodeCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl CodeCipher {
    /// Derive the encryption key from the deployment secret.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a plaintext code into the `nonce.tag.ciphertext` layout.
    ///
    /// A fresh random 96-bit nonce is drawn per value, so encrypting the
    /// same code twice yields different payloads.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::Internal("invalid encryption key length".to_string()))?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the 16-byte tag to the ciphertext
        let mut sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal("encryption failed".to_string()))?;

        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        let ciphertext = sealed;

        Ok([
            B64.encode(nonce_bytes),
            B64.encode(tag),
            B64.encode(ciphertext),
        ]
        .join("."))
    }

    /// Decrypt a stored `nonce.tag.ciphertext` payload.
    ///
    /// Fails closed with [`AppError::CorruptCiphertext`] on any malformed
    /// segment, wrong segment count or authentication tag mismatch. Callers
    /// must not treat this as "not found": the row exists, its contents can
    /// no longer be trusted.
    pub fn decrypt(&self, payload: &str) -> Result<String, AppError> {
        let parts: Vec<&str> = payload.split('.').collect();
        if parts.len() != 3 {
            return Err(AppError::CorruptCiphertext);
        }

        let nonce_bytes = B64
            .decode(parts[0])
            .map_err(|_| AppError::CorruptCiphertext)?;
        let tag = B64
            .decode(parts[1])
            .map_err(|_| AppError::CorruptCiphertext)?;
        let ciphertext = B64
            .decode(parts[2])
            .map_err(|_| AppError::CorruptCiphertext)?;

        if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(AppError::CorruptCiphertext);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| AppError::CorruptCiphertext)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        // Reassemble ciphertext || tag, the shape aes-gcm verifies
        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plain = cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| AppError::CorruptCiphertext)?;

        String::from_utf8(plain).map_err(|_| AppError::CorruptCiphertext)
    }
}

/// Deterministic dedup fingerprint of a plaintext code (SHA-256 hex).
///
/// Unique per product via the `(product_id, code_sha256)` constraint.
pub fn fingerprint(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Verify an HMAC-SHA256 webhook signature over the raw request body.
///
/// The signature header carries lowercase hex. Comparison is constant-time
/// via `Mac::verify_slice`.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Compute the hex HMAC-SHA256 signature for a body.
///
/// Exists so tests and operator tooling can produce valid webhook calls.
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CodeCipher {
        CodeCipher::from_secret("unit-test-secret")
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let c = cipher();
        let payload = c.encrypt("STEAM-ABCD-1234").unwrap();
        assert_eq!(c.decrypt(&payload).unwrap(), "STEAM-ABCD-1234");
    }

    #[test]
    fn payload_has_three_base64_segments() {
        let payload = cipher().encrypt("code").unwrap();
        let parts: Vec<&str> = payload.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(B64.decode(parts[0]).unwrap().len(), NONCE_LEN);
        assert_eq!(B64.decode(parts[1]).unwrap().len(), TAG_LEN);
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let c = cipher();
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn tampered_tag_fails_closed() {
        let c = cipher();
        let payload = c.encrypt("secret-code").unwrap();
        let mut parts: Vec<String> = payload.split('.').map(String::from).collect();
        let mut tag = B64.decode(&parts[1]).unwrap();
        tag[0] ^= 0x01;
        parts[1] = B64.encode(tag);
        let tampered = parts.join(".");

        assert!(matches!(
            c.decrypt(&tampered),
            Err(AppError::CorruptCiphertext)
        ));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let payload = cipher().encrypt("secret-code").unwrap();
        let other = CodeCipher::from_secret("a-different-secret");
        assert!(matches!(
            other.decrypt(&payload),
            Err(AppError::CorruptCiphertext)
        ));
    }

    #[test]
    fn malformed_payloads_fail_closed() {
        let c = cipher();
        for bad in ["", "one.two", "a.b.c.d", "!!!.???.###"] {
            assert!(
                matches!(c.decrypt(bad), Err(AppError::CorruptCiphertext)),
                "payload {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_distinct() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        // hex sha256
        assert_eq!(fingerprint("abc").len(), 64);
    }

    #[test]
    fn webhook_signature_verifies() {
        let body = br#"{"order_no":"123","status":"success"}"#;
        let sig = webhook_signature("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));
        assert!(!verify_webhook_signature("whsec", b"other body", &sig));
        assert!(!verify_webhook_signature("wrong", body, &sig));
        assert!(!verify_webhook_signature("whsec", body, "zz-not-hex"));
    }
}
