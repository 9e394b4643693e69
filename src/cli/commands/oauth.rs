//! OAuth client registration and OIDC provider arguments.

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::{Host, Url};

pub const ARG_ISSUER_URL: &str = "oidc-issuer-url";
pub const ARG_CLIENT_ID: &str = "oauth-client-id";
pub const ARG_CLIENT_SECRET: &str = "oauth-client-secret";
pub const ARG_REDIRECT_URL: &str = "oauth-redirect-url";
pub const ARG_PROVIDER: &str = "oauth-provider";
pub const ARG_SCOPES: &str = "oauth-scopes";
pub const ARG_STATE_COOKIE_TTL: &str = "state-cookie-ttl-seconds";
pub const ARG_JWKS_CACHE_TTL: &str = "jwks-cache-ttl-seconds";
pub const ARG_HTTP_TIMEOUT: &str = "http-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_client_args(command);
    with_provider_args(command)
}

fn with_client_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("OAuth client id, also the expected identity token audience")
                .env("IDGATE_OAUTH_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("OAuth client secret")
                .env("IDGATE_OAUTH_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REDIRECT_URL)
                .long(ARG_REDIRECT_URL)
                .help("Callback URL registered with the provider")
                .long_help(
                    "Callback URL registered with the provider, e.g. https://api.example.com/auth/google/callback. The state cookie is marked Secure when this is https.",
                )
                .env("IDGATE_OAUTH_REDIRECT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SCOPES)
                .long(ARG_SCOPES)
                .help("Space separated scopes to request (openid is always included)")
                .env("IDGATE_OAUTH_SCOPES")
                .default_value("openid email profile"),
        )
        .arg(
            Arg::new(ARG_STATE_COOKIE_TTL)
                .long(ARG_STATE_COOKIE_TTL)
                .help("Lifetime of the oauthstate cookie in seconds")
                .env("IDGATE_STATE_COOKIE_TTL_SECONDS")
                .default_value("31536000")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_provider_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER_URL)
                .long(ARG_ISSUER_URL)
                .help("OIDC issuer URL, used for discovery")
                .env("IDGATE_OIDC_ISSUER_URL")
                .default_value("https://accounts.google.com"),
        )
        .arg(
            Arg::new(ARG_PROVIDER)
                .long(ARG_PROVIDER)
                .help("Provider name accepted in /auth/{provider}/callback")
                .env("IDGATE_OAUTH_PROVIDER")
                .default_value("google"),
        )
        .arg(
            Arg::new(ARG_JWKS_CACHE_TTL)
                .long(ARG_JWKS_CACHE_TTL)
                .help("How long fetched signing keys are trusted before revalidation")
                .env("IDGATE_JWKS_CACHE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_HTTP_TIMEOUT)
                .long(ARG_HTTP_TIMEOUT)
                .help("Timeout for calls to the identity provider in seconds")
                .env("IDGATE_HTTP_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: String,
    pub provider: String,
    pub scopes: String,
    pub state_cookie_ttl_seconds: i64,
    pub jwks_cache_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing or a URL is unusable.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let issuer_url = string_arg(matches, ARG_ISSUER_URL)?;
        validate_issuer_url(&issuer_url)?;

        let redirect_url = string_arg(matches, ARG_REDIRECT_URL)?;
        Url::parse(&redirect_url)
            .with_context(|| format!("invalid --{ARG_REDIRECT_URL}: {redirect_url}"))?;

        let provider = string_arg(matches, ARG_PROVIDER)?;
        if provider.is_empty() || provider.contains('/') {
            return Err(anyhow!("invalid --{ARG_PROVIDER}: {provider}"));
        }

        Ok(Self {
            issuer_url,
            client_id: string_arg(matches, ARG_CLIENT_ID)?,
            client_secret: SecretString::from(string_arg(matches, ARG_CLIENT_SECRET)?),
            redirect_url,
            provider,
            scopes: string_arg(matches, ARG_SCOPES)?,
            state_cookie_ttl_seconds: matches
                .get_one::<i64>(ARG_STATE_COOKIE_TTL)
                .copied()
                .unwrap_or(31_536_000),
            jwks_cache_ttl_seconds: matches
                .get_one::<u64>(ARG_JWKS_CACHE_TTL)
                .copied()
                .unwrap_or(300),
            http_timeout_seconds: matches
                .get_one::<u64>(ARG_HTTP_TIMEOUT)
                .copied()
                .unwrap_or(10),
        })
    }
}

fn string_arg(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("missing required argument: --{name}"))
}

/// The issuer must be https, except for loopback hosts used in development.
///
/// # Errors
/// Returns an error if the URL does not parse or uses plain http elsewhere.
pub fn validate_issuer_url(issuer_url: &str) -> Result<()> {
    let url = Url::parse(issuer_url)
        .with_context(|| format!("invalid --{ARG_ISSUER_URL}: {issuer_url}"))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(&url) => Ok(()),
        scheme => Err(anyhow!(
            "--{ARG_ISSUER_URL} must use https (got {scheme}://{})",
            url.host_str().unwrap_or_default()
        )),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_must_be_https_unless_loopback() {
        assert!(validate_issuer_url("https://accounts.google.com").is_ok());
        assert!(validate_issuer_url("http://localhost:8081").is_ok());
        assert!(validate_issuer_url("http://127.0.0.1:8081").is_ok());
        assert!(validate_issuer_url("http://[::1]:8081").is_ok());
        assert!(validate_issuer_url("http://idp.example.test").is_err());
        assert!(validate_issuer_url("ftp://idp.example.test").is_err());
        assert!(validate_issuer_url("not a url").is_err());
    }
}
