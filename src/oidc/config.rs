use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_SCOPES: &str = "openid email profile";
const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// OAuth 2.0 client registration plus the OIDC issuer to trust.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    issuer_url: String,
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
    scopes: Vec<String>,
    jwks_cache_ttl: Duration,
    http_timeout: Duration,
}

impl OAuthConfig {
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: SecretString,
        redirect_url: String,
    ) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_url,
            scopes: DEFAULT_SCOPES.split_whitespace().map(str::to_string).collect(),
            jwks_cache_ttl: Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECONDS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
        }
    }

    /// Space separated, as in the `scope` parameter. `openid` is always kept.
    #[must_use]
    pub fn with_scopes(mut self, scopes: &str) -> Self {
        let mut parsed: Vec<String> = scopes.split_whitespace().map(str::to_string).collect();
        if !parsed.iter().any(|scope| scope == "openid") {
            parsed.insert(0, "openid".to_string());
        }
        self.scopes = parsed;
        self
    }

    #[must_use]
    pub fn with_jwks_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.jwks_cache_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_http_timeout_seconds(mut self, seconds: u64) -> Self {
        self.http_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn jwks_cache_ttl(&self) -> Duration {
        self.jwks_cache_ttl
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}
