//! Login initiation: issue a state token and point the caller at the provider.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::{
    error::AuthError,
    state::AuthState,
    types::{ErrorBody, UrlResponse},
    utils::{generate_state_token, state_cookie},
};

#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 307, description = "Redirect to the provider consent page; sets the oauthstate cookie"),
        (status = 500, description = "Failed to start login", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(auth_state: Extension<Arc<AuthState>>) -> Result<Response, AuthError> {
    let (url, cookie) = begin_attempt(&auth_state)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((headers, Redirect::temporary(url.as_str())).into_response())
}

/// Same as `/auth/login` without the redirect, for clients that navigate on
/// their own. The state cookie is still set so the callback can be checked.
#[utoipa::path(
    get,
    path = "/auth/url",
    responses(
        (status = 200, description = "Consent page URL", body = UrlResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorBody),
        (status = 500, description = "Failed to start login", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn consent_url(auth_state: Extension<Arc<AuthState>>) -> Result<Response, AuthError> {
    let (url, cookie) = begin_attempt(&auth_state)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((
        headers,
        Json(UrlResponse {
            url: url.to_string(),
        }),
    )
        .into_response())
}

fn begin_attempt(auth_state: &AuthState) -> Result<(Url, HeaderValue), AuthError> {
    let state = generate_state_token().map_err(|err| AuthError::Internal(format!("{err:#}")))?;
    let cookie = state_cookie(auth_state.config(), &state)
        .map_err(|err| AuthError::Internal(format!("failed to build state cookie: {err}")))?;
    let url = auth_state.provider().consent_url(&state);
    debug!(host = url.host_str().unwrap_or_default(), "login attempt started");
    Ok((url, cookie))
}
