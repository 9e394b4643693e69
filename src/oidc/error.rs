use thiserror::Error;

/// Failures surfaced by an [`IdentityProvider`](super::IdentityProvider).
///
/// Messages carry internal detail for logs only; HTTP handlers map these to
/// generic responses.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("token response did not include an id_token")]
    MissingIdentityToken,
    #[error("invalid identity token: {0}")]
    InvalidToken(#[from] super::jwt::Error),
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider discovery failed: {0}")]
    Discovery(String),
}
