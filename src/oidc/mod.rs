//! OAuth 2.0 / OpenID Connect identity provider client.
//!
//! The login flow and the access gate only depend on [`IdentityProvider`]:
//! build a consent URL, exchange an authorization code, verify an identity
//! token. [`OidcClient`] is the network-backed implementation; tests swap in
//! their own.

mod client;
mod config;
pub mod discovery;
mod error;
pub mod jwks;
pub mod jwt;
mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use client::OidcClient;
pub use config::OAuthConfig;
pub use discovery::ProviderMetadata;
pub use error::Error;
pub use jwt::IdTokenClaims;
pub use verifier::{IdTokenVerifier, KeysetStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Token endpoint response for the authorization-code grant.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenSet {
    /// The raw identity token, if the provider returned a non-empty one.
    ///
    /// # Errors
    /// [`Error::MissingIdentityToken`] when `id_token` is absent or blank.
    pub fn id_token(&self) -> Result<&str, Error> {
        self.id_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingIdentityToken)
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("id_token", &self.id_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page URL carrying `state` and an offline-access hint.
    fn consent_url(&self, state: &str) -> Url;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, Error>;

    /// Verify signature, issuer, audience, and expiry of an identity token.
    async fn verify_id_token(&self, raw_token: &str) -> Result<IdTokenClaims, Error>;

    /// Signing key availability, for health reporting.
    async fn keyset_status(&self) -> KeysetStatus;
}
