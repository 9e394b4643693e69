use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use super::types::ErrorBody;
use crate::oidc;

/// Terminal failures of a login attempt or a gated request.
///
/// The message is for logs. Callers only ever see [`ErrorBody`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),
    #[error("state mismatch")]
    StateMismatch,
    #[error("missing credential")]
    MissingCredential,
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("token response did not include an id_token")]
    MissingIdentityToken,
    #[error("invalid identity token: {0}")]
    InvalidToken(String),
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
    #[error("user directory error: {0}")]
    DirectoryError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Self::StateMismatch
            | Self::MissingCredential
            | Self::InvalidToken(_)
            | Self::ProviderUnavailable(_) => StatusCode::UNAUTHORIZED,
            Self::ExchangeFailed(_)
            | Self::MissingIdentityToken
            | Self::MalformedClaims(_)
            | Self::DirectoryError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(super) fn directory(err: &anyhow::Error) -> Self {
        Self::DirectoryError(format!("{err:#}"))
    }
}

impl From<oidc::Error> for AuthError {
    fn from(err: oidc::Error) -> Self {
        match err {
            oidc::Error::ExchangeFailed(detail) => Self::ExchangeFailed(detail),
            oidc::Error::MissingIdentityToken => Self::MissingIdentityToken,
            oidc::Error::InvalidToken(err) => Self::InvalidToken(err.to_string()),
            oidc::Error::ProviderUnavailable(detail) | oidc::Error::Discovery(detail) => {
                Self::ProviderUnavailable(detail)
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "authentication failed");
        } else {
            warn!(error = %self, "authentication rejected");
        }

        let message = match status {
            StatusCode::BAD_REQUEST => "bad request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            _ => "internal server error",
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::jwt;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AuthError::MissingParameter("code").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::StateMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::ProviderUnavailable("down".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::DirectoryError("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::MalformedClaims("email".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn provider_errors_map_to_flow_failures() {
        let err = AuthError::from(oidc::Error::InvalidToken(jwt::Error::Expired));
        assert!(matches!(err, AuthError::InvalidToken(_)));

        let err = AuthError::from(oidc::Error::Discovery("dns".into()));
        assert!(matches!(err, AuthError::ProviderUnavailable(_)));

        let err = AuthError::from(oidc::Error::MissingIdentityToken);
        assert!(matches!(err, AuthError::MissingIdentityToken));
    }

    #[test]
    fn directory_error_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to lookup user");
        let mapped = AuthError::directory(&err);
        assert!(
            matches!(mapped, AuthError::DirectoryError(ref msg) if msg.contains("connection refused"))
        );
    }
}
