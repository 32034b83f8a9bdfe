//! Device code and user code generation.
//!
//! Device codes are 32 random bytes, hex encoded. User codes are 8 symbols drawn from an
//! alphabet without `0`, `O`, `1` and `I`, grouped as `XXXX-XXXX`.

use rand::Rng;

/// Number of random bytes in a device code.
pub const DEVICE_CODE_BYTES: usize = 32;

/// Symbols a user code is drawn from.
pub const USER_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in a user code, excluding the separator.
pub const USER_CODE_LENGTH: usize = 8;

const USER_CODE_GROUP_SIZE: usize = 4;

/// Source of candidate codes for new flows.
///
/// Candidates are not guaranteed unique; the caller checks them against the store.
pub trait CodeGenerator: Send + Sync {
    fn device_code(&self) -> String;
    fn user_code(&self) -> String;
}

/// Generates codes from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn device_code(&self) -> String {
        generate_device_code()
    }

    fn user_code(&self) -> String {
        generate_user_code()
    }
}

/// Generate a cryptographically random device code.
pub fn generate_device_code() -> String {
    let random_bytes: [u8; DEVICE_CODE_BYTES] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}

/// Generate a cryptographically random user code such as `K7QD-M2XW`.
pub fn generate_user_code() -> String {
    let random_bytes: [u8; USER_CODE_LENGTH] = rand::thread_rng().gen();
    // The alphabet length divides 256, so the modulo does not bias any symbol.
    let symbols: String = random_bytes
        .iter()
        .map(|byte| USER_CODE_ALPHABET[*byte as usize % USER_CODE_ALPHABET.len()] as char)
        .collect();
    group(&symbols)
}

/// Normalize a user code typed by a person.
///
/// Uppercases, drops everything that is not an ASCII letter or digit and regroups into
/// `XXXX-XXXX` when exactly eight symbols remain. Any other length is returned ungrouped,
/// which simply fails lookup later.
pub fn normalize_user_code(value: &str) -> String {
    let normalized: String = value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.len() != USER_CODE_LENGTH {
        return normalized;
    }

    group(&normalized)
}

fn group(symbols: &str) -> String {
    let (prefix, suffix) = symbols.split_at(USER_CODE_GROUP_SIZE);
    format!("{prefix}-{suffix}")
}
