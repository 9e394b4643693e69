//! Provider callback: the only place a session credential is issued.
//!
//! Steps run strictly in order and each one gates the next:
//! state check, code exchange, identity token extraction, verification,
//! claim extraction, find-or-create. Nothing reaches the provider before the
//! state matches, and nothing reaches the directory before the token verifies.

use axum::{
    extract::{Extension, Path, Query},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    error::AuthError,
    state::AuthState,
    types::{identity_from_claims, CallbackParams, ErrorBody, TokenResponse},
    utils::{clear_state_cookie, extract_cookie, state_matches, STATE_COOKIE_NAME},
};

#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Configured provider name"),
        CallbackParams
    ),
    responses(
        (status = 200, description = "Login completed; the verified identity token", body = TokenResponse),
        (status = 400, description = "Missing code or state", body = ErrorBody),
        (status = 401, description = "State mismatch or invalid identity token", body = ErrorBody),
        (status = 404, description = "Unknown provider"),
        (status = 500, description = "Login failed", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn callback(
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let config = auth_state.config();
    if provider != config.provider_name() {
        debug!(provider = %provider, "callback for unknown provider");
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut response = match complete_login(&auth_state, &headers, params).await {
        Ok(token) => Json(TokenResponse { token }).into_response(),
        Err(err) => err.into_response(),
    };

    // The state value is single use, whatever the outcome.
    match clear_state_cookie(config) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build state cookie: {err}"),
    }

    response
}

async fn complete_login(
    auth_state: &AuthState,
    headers: &HeaderMap,
    params: CallbackParams,
) -> Result<String, AuthError> {
    let returned_state = params
        .state
        .filter(|state| !state.is_empty())
        .ok_or(AuthError::MissingParameter("state"))?;
    let issued_state =
        extract_cookie(headers, STATE_COOKIE_NAME).ok_or(AuthError::StateMismatch)?;
    if !state_matches(&issued_state, &returned_state) {
        return Err(AuthError::StateMismatch);
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or(AuthError::MissingParameter("code"))?;

    let provider = auth_state.provider();
    let tokens = provider.exchange_code(&code).await?;
    let raw_token = tokens.id_token()?.to_string();
    let claims = provider.verify_id_token(&raw_token).await?;
    let identity = identity_from_claims(&claims)?;

    let user = auth_state
        .directory()
        .find_or_create(&identity)
        .await
        .map_err(|err| AuthError::directory(&err))?;

    info!(user_id = %user.id, "login completed");

    Ok(raw_token)
}
