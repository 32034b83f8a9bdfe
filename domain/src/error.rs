//! Error types for the `domain` layer.
use device_auth::error::{Error as DeviceAuthError, ErrorKind as DeviceAuthErrorKind};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field is used to hold the original error that caused
/// the domain error. `web` maps the `error_kind`s to HTTP status codes without depending
/// on `device-auth` or `entity_api` directly.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    Caller(CallerErrorKind),
}

/// Failures on the server side that the caller cannot fix.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    /// The flow store failed or could not be reached.
    Store,
    /// Unique codes could not be generated.
    CodeGeneration,
    Config,
    Other(String),
}

/// Failures caused by what the caller sent.
#[derive(Debug, PartialEq)]
pub enum CallerErrorKind {
    Unauthenticated,
    InvalidUserCode,
    MissingAccessToken,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {:?}", self.error_kind)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error {
            source: Some(message.into().into()),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
        }
    }
}

// This is where we translate errors from the `device-auth` layer to the `domain` layer.
impl From<DeviceAuthError> for Error {
    fn from(err: DeviceAuthError) -> Self {
        let error_kind = match &err.error_kind {
            DeviceAuthErrorKind::Unauthorized => {
                DomainErrorKind::Caller(CallerErrorKind::Unauthenticated)
            }
            DeviceAuthErrorKind::InvalidUserCode => {
                DomainErrorKind::Caller(CallerErrorKind::InvalidUserCode)
            }
            DeviceAuthErrorKind::MissingAccessToken => {
                DomainErrorKind::Caller(CallerErrorKind::MissingAccessToken)
            }
            DeviceAuthErrorKind::CodeGeneration => {
                DomainErrorKind::Internal(InternalErrorKind::CodeGeneration)
            }
            DeviceAuthErrorKind::Store(_) => DomainErrorKind::Internal(InternalErrorKind::Store),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Caller(CallerErrorKind::Unauthenticated),
        }
    }
}
