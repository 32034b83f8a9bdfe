use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use domain::{identity, CallerIdentity};
use log::*;
use service::AppState;

/// The approver named by a verified `Authorization: Bearer` token.
///
/// Handlers take `Option<AuthenticatedCaller>` so that an unauthenticated request still
/// reaches the domain, which owns the decision to refuse it.
pub(crate) struct AuthenticatedCaller(pub CallerIdentity);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = RejectionType;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || (StatusCode::UNAUTHORIZED, "Unauthorized".to_string());

        let token = bearer_token(parts).ok_or_else(unauthorized)?;

        let Some(secret) = state.config.identity_jwt_secret() else {
            warn!("Bearer token presented but IDENTITY_JWT_SECRET is not configured");
            return Err(unauthorized());
        };

        match identity::verify_bearer(token, &secret) {
            Ok(caller) => Ok(AuthenticatedCaller(caller)),
            Err(_) => Err(unauthorized()),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}
