//! Verification of the identity provider's bearer tokens.
//!
//! The identity provider signs HS256 JWTs with a secret shared with this service. The
//! `sub` claim is the approver's external id.

use crate::error::Error;
use device_auth::CallerIdentity;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IdentityClaims {
    pub sub: String,
    pub exp: u64,
}

/// Verifies `token` and returns the identity it names.
pub fn verify_bearer(token: &str, secret: &str) -> Result<CallerIdentity, Error> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| {
        debug!("Rejecting bearer token: {err}");
        err
    })?;

    if data.claims.sub.trim().is_empty() {
        warn!("Bearer token has an empty subject");
        return Err(Error::from(jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::InvalidSubject,
        )));
    }

    Ok(CallerIdentity::new(data.claims.sub))
}
