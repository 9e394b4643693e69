use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};
use url::Url;

use super::Error;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";
const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// The subset of provider metadata the login flow needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

impl ProviderMetadata {
    /// Check that every advertised endpoint is a usable URL.
    ///
    /// # Errors
    /// Returns [`Error::Discovery`] naming the first endpoint that does not parse.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ] {
            Url::parse(value).map_err(|e| Error::Discovery(format!("invalid {name}: {e}")))?;
        }
        Ok(())
    }

    /// Issuer values accepted in the `iss` claim: the advertised issuer,
    /// verbatim. Google still signs some tokens with its scheme-less legacy
    /// issuer.
    #[must_use]
    pub fn accepted_issuers(&self) -> Vec<String> {
        let mut issuers = vec![self.issuer.clone()];
        if self.issuer.trim_end_matches('/') == GOOGLE_ISSUER {
            issuers.push("accounts.google.com".to_string());
        }
        issuers
    }
}

#[must_use]
pub fn discovery_url(issuer_url: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", issuer_url.trim_end_matches('/'))
}

/// Fetch `{issuer}/.well-known/openid-configuration`.
///
/// The advertised `issuer` must match the configured one exactly, otherwise
/// tokens from this provider could never be trusted.
///
/// # Errors
/// Returns [`Error::Discovery`] on network failure, a non-success status,
/// an unparsable document, or an issuer mismatch.
pub async fn discover(client: &Client, issuer_url: &str) -> Result<ProviderMetadata, Error> {
    let url = discovery_url(issuer_url);
    let span = info_span!("oidc.discovery", http.method = "GET", url = %url);
    async {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!("{url} - {status}")));
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))?;

        if metadata.issuer.trim_end_matches('/') != issuer_url.trim_end_matches('/') {
            return Err(Error::Discovery(format!(
                "issuer mismatch: expected {issuer_url}, provider advertised {}",
                metadata.issuer
            )));
        }
        metadata.validate()?;

        Ok(metadata)
    }
    .instrument(span)
    .await
}
