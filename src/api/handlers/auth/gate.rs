//! Access gate for protected routes.
//!
//! Reads `Authorization: Bearer <token>`, verifies it with the identity
//! provider's cached keys, and attaches the claims to the request. Any
//! failure, including unavailable signing keys, ends the request with 401.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::{error::AuthError, state::AuthState, utils::extract_bearer_token};
use crate::oidc::{self, IdTokenClaims};

/// Verified caller, available to handlers behind the gate.
#[derive(Clone, Debug)]
pub struct AuthenticatedIdentity {
    pub claims: IdTokenClaims,
}

/// # Errors
/// Returns [`AuthError`] (always 401) when the credential is missing or does
/// not verify.
pub async fn require_credential(
    auth_state: Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer_token(request.headers()).ok_or(AuthError::MissingCredential)?;

    let claims = auth_state
        .provider()
        .verify_id_token(&token)
        .await
        .map_err(|err| match err {
            oidc::Error::ProviderUnavailable(detail) => AuthError::ProviderUnavailable(detail),
            other => AuthError::InvalidToken(other.to_string()),
        })?;

    debug!(sub = %claims.sub, "credential verified");
    request
        .extensions_mut()
        .insert(AuthenticatedIdentity { claims });

    Ok(next.run(request).await)
}
