//! AES-256-GCM encryption of escorted access tokens while they sit in the database.
//!
//! A token lives in the `device_flows` row only between approval and consumption. When a
//! TOKEN_ENCRYPTION_KEY is configured (32 bytes, hex-encoded) the stored value is the
//! base64 of nonce + ciphertext; otherwise tokens are stored as given.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use thiserror::Error;

/// 12-byte nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

/// Errors that can occur during encryption/decryption operations
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Invalid encryption key: must be 32 bytes (64 hex characters)")]
    InvalidKey,

    #[error("Failed to decode hex key: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    #[error("Failed to decode base64 ciphertext: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or key is incorrect")]
    DecryptionFailed,

    #[error("Ciphertext too short - missing nonce")]
    CiphertextTooShort,
}

/// Encrypts plaintext with a random nonce and returns base64(nonce + ciphertext).
pub fn encrypt(plaintext: &str, key_hex: &str) -> Result<String, EncryptionError> {
    let cipher = cipher(key_hex)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(ciphertext);

    Ok(BASE64.encode(combined))
}

/// Reverses `encrypt`.
pub fn decrypt(ciphertext_b64: &str, key_hex: &str) -> Result<String, EncryptionError> {
    let cipher = cipher(key_hex)?;
    let combined = BASE64.decode(ciphertext_b64)?;

    if combined.len() < NONCE_SIZE {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let plaintext_bytes = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)?;

    String::from_utf8(plaintext_bytes).map_err(|_| EncryptionError::DecryptionFailed)
}

/// Prepares a token for storage, encrypting it only when a key is configured.
pub fn seal(token: String, key_hex: Option<&str>) -> Result<String, EncryptionError> {
    match key_hex {
        Some(key) => encrypt(&token, key),
        None => Ok(token),
    }
}

/// Reads a stored token back, decrypting it only when a key is configured.
pub fn open(stored: Option<String>, key_hex: Option<&str>) -> Result<Option<String>, EncryptionError> {
    match (stored, key_hex) {
        (Some(stored), Some(key)) => Ok(Some(decrypt(&stored, key)?)),
        (stored, _) => Ok(stored),
    }
}

/// Checks that a configured key is usable before any token is written with it.
pub fn validate_key(key_hex: &str) -> Result<(), EncryptionError> {
    parse_key(key_hex).map(|_| ())
}

fn cipher(key_hex: &str) -> Result<Aes256Gcm, EncryptionError> {
    let key = parse_key(key_hex)?;
    Aes256Gcm::new_from_slice(&key).map_err(|_| EncryptionError::InvalidKey)
}

/// Parses a hex-encoded 32-byte key
fn parse_key(key_hex: &str) -> Result<[u8; 32], EncryptionError> {
    let bytes = hex::decode(key_hex)?;
    if bytes.len() != 32 {
        return Err(EncryptionError::InvalidKey);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test key: 32 bytes = 64 hex characters
    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn sealed_token_opens_with_the_same_key() {
        let sealed = seal("access-token".to_string(), Some(TEST_KEY)).unwrap();
        assert_ne!(sealed, "access-token");

        let opened = open(Some(sealed), Some(TEST_KEY)).unwrap();
        assert_eq!(opened.as_deref(), Some("access-token"));
    }

    #[test]
    fn without_a_key_tokens_pass_through() {
        assert_eq!(seal("plain".to_string(), None).unwrap(), "plain");
        assert_eq!(
            open(Some("plain".to_string()), None).unwrap().as_deref(),
            Some("plain")
        );
        assert_eq!(open(None, Some(TEST_KEY)).unwrap(), None);
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let first = encrypt("token", TEST_KEY).unwrap();
        let second = encrypt("token", TEST_KEY).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let encrypted = encrypt("token", TEST_KEY).unwrap();
        let wrong_key = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

        assert!(matches!(
            decrypt(&encrypted, wrong_key),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[test]
    fn plaintext_left_over_from_before_the_key_is_rejected() {
        let result = open(Some("not_valid_base64!!!".to_string()), Some(TEST_KEY));
        assert!(matches!(result, Err(EncryptionError::Base64DecodeError(_))));

        // "abc" in base64, too short to hold a nonce
        assert!(matches!(
            decrypt("YWJj", TEST_KEY),
            Err(EncryptionError::CiphertextTooShort)
        ));
    }

    #[test]
    fn validate_key_checks_length_and_encoding() {
        assert!(validate_key(TEST_KEY).is_ok());
        assert!(matches!(validate_key("abcd"), Err(EncryptionError::InvalidKey)));
        assert!(matches!(
            validate_key("not hex"),
            Err(EncryptionError::HexDecodeError(_))
        ));
    }
}
