//! Peppered SHA-256 hashing of device codes.
//!
//! Only the hash of a device code is persisted. Changing the pepper changes every hash,
//! so all in-flight flows become unreachable when it is rotated.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Maps raw device codes to storage keys.
pub struct DeviceCodeHasher {
    pepper: SecretString,
}

impl DeviceCodeHasher {
    /// Create a hasher with the given server-side pepper. An empty pepper is accepted.
    pub fn new(pepper: String) -> Self {
        Self {
            pepper: SecretString::new(pepper),
        }
    }

    /// Hex encoded `SHA-256(pepper + ":" + trim(raw_code))`.
    pub fn hash(&self, raw_code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pepper.expose_secret().as_bytes());
        hasher.update(b":");
        hasher.update(raw_code.trim().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for DeviceCodeHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCodeHasher")
            .field("pepper", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_of_pepper_colon_code() {
        let hasher = DeviceCodeHasher::new("pepper".to_string());
        assert_eq!(hasher.hash("abc"), hex::encode(Sha256::digest(b"pepper:abc")));

        let unpeppered = DeviceCodeHasher::new(String::new());
        assert_eq!(unpeppered.hash("abc"), hex::encode(Sha256::digest(b":abc")));
    }

    #[test]
    fn hash_is_deterministic_and_trims_input() {
        let hasher = DeviceCodeHasher::new("pepper".to_string());
        assert_eq!(hasher.hash("  abc\n"), hasher.hash("abc"));
        assert_eq!(hasher.hash("abc").len(), 64);
    }

    #[test]
    fn pepper_changes_the_hash() {
        let first = DeviceCodeHasher::new("one".to_string());
        let second = DeviceCodeHasher::new("two".to_string());
        assert_ne!(first.hash("abc"), second.hash("abc"));
    }

    #[test]
    fn debug_output_redacts_pepper() {
        let hasher = DeviceCodeHasher::new("super-secret".to_string());
        assert!(!format!("{hasher:?}").contains("super-secret"));
    }
}
