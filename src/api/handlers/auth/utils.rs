//! Small helpers for state tokens, cookies, and credential extraction.

use anyhow::{Context, Result};
use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use subtle::ConstantTimeEq;

use super::state::AuthConfig;

pub(crate) const STATE_COOKIE_NAME: &str = "oauthstate";

/// Fresh, unguessable value for one login attempt.
pub(super) fn generate_state_token() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate state token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Compare the issued and returned state without an early exit on the first
/// differing byte.
pub(super) fn state_matches(issued: &str, returned: &str) -> bool {
    issued.as_bytes().ct_eq(returned.as_bytes()).into()
}

pub(super) fn state_cookie(
    config: &AuthConfig,
    state: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.state_cookie_ttl_seconds();
    let mut cookie = format!(
        "{STATE_COOKIE_NAME}={state}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.state_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_state_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{STATE_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.state_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Value of cookie `name`, if present and non-empty.
pub(super) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, val)| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Basic email format check.
pub(super) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_token_is_16_random_bytes() {
        let first = generate_state_token().ok();
        let second = generate_state_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);

        let decoded_len = first
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(16));
    }

    #[test]
    fn state_matches_only_identical_values() {
        assert!(state_matches("s-1_xYz", "s-1_xYz"));
        assert!(!state_matches("s-1_xYz", "s-1_xYZ"));
        assert!(!state_matches("s-1_xYz", "s-1_xY"));
        assert!(!state_matches("s-1_xYz", ""));
    }

    #[test]
    fn state_cookie_attributes() {
        let config = AuthConfig::new("https://app.example.test/auth/google/callback".to_string())
            .with_state_cookie_ttl_seconds(120);
        let cookie = state_cookie(&config, "abc").ok();
        let cookie = cookie.as_ref().and_then(|value| value.to_str().ok());
        assert_eq!(
            cookie,
            Some("oauthstate=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=120; Secure")
        );

        let cleared = clear_state_cookie(&config).ok();
        let cleared = cleared.as_ref().and_then(|value| value.to_str().ok());
        assert_eq!(
            cleared,
            Some("oauthstate=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
        );
    }

    #[test]
    fn cookie_is_not_secure_over_plain_http() {
        let config = AuthConfig::new("http://localhost:8080/auth/google/callback".to_string());
        let cookie = state_cookie(&config, "abc").ok();
        let cookie = cookie.as_ref().and_then(|value| value.to_str().ok());
        assert!(cookie.is_some_and(|value| !value.contains("Secure")));
    }

    #[test]
    fn extract_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; oauthstate=s-1_x; other"),
        );
        assert_eq!(
            extract_cookie(&headers, STATE_COOKIE_NAME),
            Some("s-1_x".to_string())
        );
        assert_eq!(extract_cookie(&headers, "missing"), None);

        headers.insert(COOKIE, HeaderValue::from_static("oauthstate="));
        assert_eq!(extract_cookie(&headers, STATE_COOKIE_NAME), None);
    }

    #[test]
    fn extract_bearer_token_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(extract_bearer_token(&headers), Some("a.b.c".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   x.y.z "));
        assert_eq!(extract_bearer_token(&headers), Some("x.y.z".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn valid_email_format() {
        assert!(valid_email("a@x.com"));
        assert!(valid_email("First.Last+tag@example.co.uk"));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("a b@x.com"));
    }
}
