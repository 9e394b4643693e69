use axum::{extract::Extension, response::Json};
use std::sync::Arc;

use super::{
    error::AuthError,
    gate::AuthenticatedIdentity,
    state::AuthState,
    types::{identity_from_claims, ErrorBody},
};
use crate::directory::User;

/// Resolve (or create) the local user for an already verified caller.
///
/// The credential was checked by the gate; it is not verified again here.
#[utoipa::path(
    get,
    path = "/auth/user",
    responses(
        (status = 200, description = "Local user record", body = User),
        (status = 401, description = "Missing or invalid credential", body = ErrorBody),
        (status = 500, description = "Directory failure or malformed claims", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn find_create_user(
    auth_state: Extension<Arc<AuthState>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<User>, AuthError> {
    let new_user = identity_from_claims(&identity.claims)?;
    let user = auth_state
        .directory()
        .find_or_create(&new_user)
        .await
        .map_err(|err| AuthError::directory(&err))?;
    Ok(Json(user))
}
