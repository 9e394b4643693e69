//! Auth configuration and the shared handler state.

use std::sync::Arc;

use crate::{directory::UserDirectory, oidc::IdentityProvider};

const DEFAULT_PROVIDER_NAME: &str = "google";
const DEFAULT_STATE_COOKIE_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    redirect_url: String,
    provider_name: String,
    state_cookie_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(redirect_url: String) -> Self {
        Self {
            redirect_url,
            provider_name: DEFAULT_PROVIDER_NAME.to_string(),
            state_cookie_ttl_seconds: DEFAULT_STATE_COOKIE_TTL_SECONDS,
        }
    }

    /// Name accepted in the `/auth/{provider}/callback` path segment.
    #[must_use]
    pub fn with_provider_name(mut self, provider_name: String) -> Self {
        self.provider_name = provider_name;
        self
    }

    #[must_use]
    pub fn with_state_cookie_ttl_seconds(mut self, seconds: i64) -> Self {
        self.state_cookie_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    pub(super) fn state_cookie_ttl_seconds(&self) -> i64 {
        self.state_cookie_ttl_seconds
    }

    pub(super) fn state_cookie_secure(&self) -> bool {
        self.redirect_url.starts_with("https://")
    }
}

/// Everything the login flow and the access gate need, passed in at
/// construction.
pub struct AuthState {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn UserDirectory>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            config,
            provider,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }
}
