use async_trait::async_trait;
use reqwest::{header::ACCEPT, redirect::Policy, Client};
use secrecy::ExposeSecret;
use tracing::{error, info_span, Instrument};
use url::Url;

use super::{
    discovery::{self, ProviderMetadata},
    jwt::IdTokenClaims,
    Error, IdTokenVerifier, IdentityProvider, KeysetStatus, OAuthConfig, TokenSet,
};

/// Provider error bodies are logged, but only this much of them.
const MAX_LOGGED_BODY: usize = 512;

/// [`IdentityProvider`] backed by a real OIDC provider over HTTPS.
#[derive(Debug)]
pub struct OidcClient {
    config: OAuthConfig,
    metadata: ProviderMetadata,
    authorization_endpoint: Url,
    http: Client,
    verifier: IdTokenVerifier,
}

impl OidcClient {
    /// Discover the provider from its issuer URL and prime the key cache.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] if the HTTP client cannot be built or the
    /// discovery document is unusable.
    pub async fn discover(config: OAuthConfig) -> Result<Self, Error> {
        let http = http_client(&config)?;
        let metadata = discovery::discover(&http, config.issuer_url()).await?;
        Self::new(config, metadata, http).await
    }

    /// Build from already known provider metadata.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] if the metadata endpoints are not valid URLs.
    pub async fn new(
        config: OAuthConfig,
        metadata: ProviderMetadata,
        http: Client,
    ) -> Result<Self, Error> {
        metadata.validate()?;
        let authorization_endpoint = Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| Error::Discovery(format!("invalid authorization_endpoint: {e}")))?;

        let verifier = IdTokenVerifier::new_remote(
            metadata.jwks_uri.clone(),
            http.clone(),
            metadata.accepted_issuers(),
            config.client_id().to_string(),
            config.jwks_cache_ttl(),
        )
        .await;

        Ok(Self {
            config,
            metadata,
            authorization_endpoint,
            http,
            verifier,
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }
}

/// HTTP client for provider calls: bounded by the configured timeout and
/// never following redirects.
///
/// # Errors
/// Returns [`Error::Discovery`] if the client cannot be built.
pub fn http_client(config: &OAuthConfig) -> Result<Client, Error> {
    Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .timeout(config.http_timeout())
        .redirect(Policy::none())
        .build()
        .map_err(|e| Error::Discovery(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn consent_url(&self, state: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", self.config.client_id())
            .append_pair("redirect_uri", self.config.redirect_url())
            .append_pair("scope", &self.config.scopes().join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, Error> {
        let span = info_span!(
            "oidc.token.exchange",
            http.method = "POST",
            url = %self.metadata.token_endpoint
        );
        async {
            let params = [
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url()),
                ("client_id", self.config.client_id()),
                ("client_secret", self.config.client_secret().expose_secret()),
            ];

            let response = self
                .http
                .post(&self.metadata.token_endpoint)
                .header(ACCEPT, "application/json")
                .form(&params)
                .send()
                .await
                .map_err(|e| Error::ExchangeFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(MAX_LOGGED_BODY).collect();
                error!(status = %status, body = %body, "token endpoint rejected code exchange");
                return Err(Error::ExchangeFailed(format!("token endpoint returned {status}")));
            }

            response
                .json::<TokenSet>()
                .await
                .map_err(|e| Error::ExchangeFailed(format!("invalid token response: {e}")))
        }
        .instrument(span)
        .await
    }

    async fn verify_id_token(&self, raw_token: &str) -> Result<IdTokenClaims, Error> {
        self.verifier.verify(raw_token).await
    }

    async fn keyset_status(&self) -> KeysetStatus {
        self.verifier.keyset_status().await
    }
}
