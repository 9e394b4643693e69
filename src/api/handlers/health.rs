use super::auth::AuthState;
use crate::{oidc::KeysetStatus, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    directory: String,
    signing_keys: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "User directory and provider signing keys are healthy", body = [Health]),
        (status = 503, description = "User directory or provider signing keys are unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let directory = auth_state.directory().ping().await;
    if let Err(err) = &directory {
        error!("User directory is unreachable: {err:#}");
    }

    let keyset_status = auth_state.provider().keyset_status().await;
    let is_healthy = directory.is_ok() && keyset_status.is_healthy();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        directory: if directory.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
        signing_keys: keyset_status.as_str().to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    match keyset_status {
        KeysetStatus::Ok => debug!("Signing keys are healthy"),
        KeysetStatus::Error => debug!("Signing keys are unavailable"),
        KeysetStatus::Static => debug!("Signing keys are static"),
    }

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
