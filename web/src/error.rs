use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use domain::error::{CallerErrorKind, DomainErrorKind, Error as DomainError};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// Caller mistakes on approve share one body so that unknown codes and empty
// tokens look alike to a probing client.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self.0.error_kind {
            DomainErrorKind::Caller(caller_error_kind) => match caller_error_kind {
                CallerErrorKind::Unauthenticated => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED").into_response()
                }
                CallerErrorKind::InvalidUserCode | CallerErrorKind::MissingAccessToken => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
                }
            },
            DomainErrorKind::Internal(internal_error_kind) => {
                match self.0.source() {
                    Some(source) => error!("{internal_error_kind:?}: {source}"),
                    None => error!("{internal_error_kind:?}"),
                }
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
