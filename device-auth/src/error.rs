//! Error types for the `device-auth` crate.
//!
//! Follows the same pattern as domain::error with a root Error struct and error kind enums.
//! Protocol outcomes such as expiry, rate limiting and unknown device codes are not errors;
//! they are reported through `PollResponse` and `ApproveStatus`.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for device-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in device-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// `approve` was called without an authenticated caller.
    Unauthorized,
    /// The user code does not identify any flow.
    InvalidUserCode,
    /// `approve` was called with an empty access token.
    MissingAccessToken,
    /// Unique code generation kept colliding.
    CodeGeneration,
    /// The flow store failed.
    Store(StoreErrorKind),
}

/// Errors from flow store operations.
#[derive(Debug, PartialEq)]
pub enum StoreErrorKind {
    /// The backing store could not be reached or rejected the operation.
    Unavailable,
    /// A unique code is already taken by another flow.
    Conflict,
    /// Encrypting or decrypting the escorted token failed.
    Encryption,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Unauthorized => write!(f, "Unauthorized"),
            ErrorKind::InvalidUserCode => write!(f, "Invalid user code"),
            ErrorKind::MissingAccessToken => write!(f, "Access token is required"),
            ErrorKind::CodeGeneration => write!(f, "Failed to generate a unique code"),
            ErrorKind::Store(kind) => write!(f, "Flow store error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }
}

/// Helper function to create flow store errors.
pub fn store_error(kind: StoreErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Store(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_leak_source_details() {
        let err = store_error(StoreErrorKind::Unavailable, "connection refused to 10.0.0.4");
        assert_eq!(err.to_string(), "Flow store error: Unavailable");
        assert!(err.source().is_some());
    }

    #[test]
    fn error_kind_converts_without_source() {
        let err: Error = ErrorKind::Unauthorized.into();
        assert_eq!(err.error_kind, ErrorKind::Unauthorized);
        assert!(err.source.is_none());
    }
}
