//! Identity token verification against a cached JWKS.
//!
//! Keys are held in memory with a TTL and revalidated with `If-None-Match`.
//! A token signed with an unknown `kid` triggers one refresh (throttled), so
//! provider key rotation is picked up without a restart. When keys cannot be
//! obtained verification fails closed with [`Error::ProviderUnavailable`].
//!
//! Refreshes are single-flight: callers that find the cache stale queue on
//! `refresh_lock` and re-check freshness once they hold it. A failed refresh
//! is not retried for `FAILED_REFRESH_BACKOFF_SECONDS`.

use anyhow::{anyhow, Context, Result};
use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    Client, StatusCode,
};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, warn, Instrument};

use super::{
    jwks::Jwks,
    jwt::{self, IdTokenClaims, Validation},
    Error,
};

const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;
const FAILED_REFRESH_BACKOFF_SECONDS: u64 = 5;
const CLOCK_SKEW_SECONDS: i64 = 30;

#[derive(Debug)]
enum KeysetSource {
    /// Keys supplied up front and never refreshed.
    Static,
    /// Keys fetched from the provider's `jwks_uri`.
    Remote { url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    keyset: Jwks,
    fetched_at: Instant,
    etag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysetStatus {
    /// Remote keys fetched (or revalidated) successfully.
    Ok,
    /// Remote keys could not be fetched.
    Error,
    /// Keys are static, nothing to fetch.
    Static,
}

impl KeysetStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

#[derive(Debug)]
pub struct IdTokenVerifier {
    keyset_source: KeysetSource,
    keyset_cache: RwLock<KeysetCache>,
    /// Accepted `iss` values.
    issuers: Vec<String>,
    /// Expected `aud`, the OAuth client id.
    audience: String,
    cache_ttl: Duration,
    /// Throttles refreshes triggered by unknown `kid`s.
    last_refresh_unix: AtomicU64,
    /// Zero until a refresh fails.
    last_failure_unix: AtomicU64,
    refresh_lock: Mutex<()>,
}

impl IdTokenVerifier {
    /// Build from a fixed keyset, no remote refresh.
    #[must_use]
    pub fn new(keyset: Jwks, issuers: Vec<String>, audience: String) -> Self {
        Self {
            keyset_source: KeysetSource::Static,
            keyset_cache: RwLock::new(KeysetCache {
                keyset,
                fetched_at: Instant::now(),
                etag: None,
            }),
            issuers,
            audience,
            cache_ttl: Duration::MAX,
            last_refresh_unix: AtomicU64::new(0),
            last_failure_unix: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Build a verifier that fetches keys from `jwks_uri`.
    ///
    /// The startup fetch is best-effort: if the provider is unreachable the
    /// cache starts empty and stale, so verification fails closed until a
    /// refresh succeeds.
    pub async fn new_remote(
        jwks_uri: String,
        client: Client,
        issuers: Vec<String>,
        audience: String,
        cache_ttl: Duration,
    ) -> Self {
        let (keyset, fetched_at, last_refresh_unix, etag) =
            match fetch_keyset(&client, &jwks_uri, None).await {
                Ok(FetchOutcome::Updated { keyset, etag }) => {
                    (keyset, Instant::now(), now_unix_seconds_u64(), etag)
                }
                Ok(FetchOutcome::NotModified) => {
                    warn!("jwks fetch returned not-modified during startup");
                    (Jwks::default(), stale_instant(cache_ttl), 0, None)
                }
                Err(err) => {
                    warn!(
                        url = %jwks_uri,
                        error = %err,
                        "jwks fetch failed during startup; continuing with empty keyset"
                    );
                    (Jwks::default(), stale_instant(cache_ttl), 0, None)
                }
            };

        Self {
            keyset_source: KeysetSource::Remote {
                url: jwks_uri,
                client,
            },
            keyset_cache: RwLock::new(KeysetCache {
                keyset,
                fetched_at,
                etag,
            }),
            issuers,
            audience,
            cache_ttl,
            last_refresh_unix: AtomicU64::new(last_refresh_unix),
            last_failure_unix: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    /// Verify signature, issuer, audience, and lifetime of `token`.
    ///
    /// # Errors
    /// [`Error::InvalidToken`] when any check fails,
    /// [`Error::ProviderUnavailable`] when signing keys cannot be obtained.
    pub async fn verify(&self, token: &str) -> Result<IdTokenClaims, Error> {
        let keyset = self.keyset_snapshot().await?;

        match self.verify_with(token, &keyset) {
            Ok(claims) => Ok(claims),
            Err(jwt::Error::UnknownKid(kid)) => match self.refresh_on_unknown_kid().await {
                Ok(true) => {
                    let keyset = self.keyset_snapshot().await?;
                    self.verify_with(token, &keyset).map_err(Error::InvalidToken)
                }
                Ok(false) => {
                    debug!(kid = %kid, "token kid not found and refresh suppressed");
                    Err(Error::InvalidToken(jwt::Error::UnknownKid(kid)))
                }
                Err(err) => Err(Error::ProviderUnavailable(err.to_string())),
            },
            Err(err) => Err(Error::InvalidToken(err)),
        }
    }

    fn verify_with(&self, token: &str, keyset: &Jwks) -> Result<IdTokenClaims, jwt::Error> {
        let validation = Validation {
            issuers: &self.issuers,
            audience: &self.audience,
            now_unix_seconds: now_unix_seconds(),
            leeway_seconds: CLOCK_SKEW_SECONDS,
        };
        jwt::verify_rs256(token, keyset, &validation)
    }

    /// Report key availability from the cache.
    ///
    /// Only fetches when the cache is stale, through the same single-flight
    /// path as verification, so polling this costs at most one fetch per TTL.
    pub async fn keyset_status(&self) -> KeysetStatus {
        if matches!(&self.keyset_source, KeysetSource::Static) {
            return KeysetStatus::Static;
        }
        match self.keyset_snapshot().await {
            Ok(keyset) if keyset.rsa_key_count() > 0 => KeysetStatus::Ok,
            Ok(_) => KeysetStatus::Error,
            Err(err) => {
                debug!(error = %err, "jwks unavailable during health check");
                KeysetStatus::Error
            }
        }
    }

    async fn fresh_keyset(&self) -> Option<Jwks> {
        let cache = self.keyset_cache.read().await;
        (cache.fetched_at.elapsed() < self.cache_ttl).then(|| cache.keyset.clone())
    }

    /// Return a keyset snapshot, refreshing it first when stale.
    async fn keyset_snapshot(&self) -> Result<Jwks, Error> {
        if let Some(keyset) = self.fresh_keyset().await {
            return Ok(keyset);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(keyset) = self.fresh_keyset().await {
            return Ok(keyset);
        }

        let since_failure =
            now_unix_seconds_u64().saturating_sub(self.last_failure_unix.load(Ordering::Relaxed));
        if since_failure < FAILED_REFRESH_BACKOFF_SECONDS {
            return Err(Error::ProviderUnavailable(
                "jwks refresh failed recently".to_string(),
            ));
        }

        if let Err(err) = self.refresh_keyset().await {
            warn!(error = %err, "failed to refresh jwks cache");
            return Err(Error::ProviderUnavailable(err.to_string()));
        }

        let cache = self.keyset_cache.read().await;
        Ok(cache.keyset.clone())
    }

    /// Callers must hold `refresh_lock`.
    async fn refresh_keyset(&self) -> Result<()> {
        let (url, client, etag) = match &self.keyset_source {
            KeysetSource::Static => return Ok(()),
            KeysetSource::Remote { url, client } => {
                let etag = self.keyset_cache.read().await.etag.clone();
                (url, client, etag)
            }
        };

        let outcome = match fetch_keyset(client, url, etag.as_deref()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.last_failure_unix
                    .store(now_unix_seconds_u64(), Ordering::Relaxed);
                return Err(err);
            }
        };
        self.last_failure_unix.store(0, Ordering::Relaxed);

        match outcome {
            FetchOutcome::NotModified => {
                let mut cache = self.keyset_cache.write().await;
                cache.fetched_at = Instant::now();
            }
            FetchOutcome::Updated { keyset, etag } => {
                let mut cache = self.keyset_cache.write().await;
                cache.keyset = keyset;
                cache.fetched_at = Instant::now();
                cache.etag = etag;
                info!(keys = cache.keyset.keys.len(), "jwks cache refreshed");
            }
        }
        self.last_refresh_unix
            .store(now_unix_seconds_u64(), Ordering::Relaxed);
        Ok(())
    }

    async fn refresh_on_unknown_kid(&self) -> Result<bool> {
        if matches!(&self.keyset_source, KeysetSource::Static) {
            return Ok(false);
        }
        let now = now_unix_seconds_u64();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return Ok(false);
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        let _guard = self.refresh_lock.lock().await;
        self.refresh_keyset().await?;
        Ok(true)
    }
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn now_unix_seconds_u64() -> u64 {
    u64::try_from(now_unix_seconds()).unwrap_or(0)
}

/// An Instant that is already past `ttl`, forcing a refresh on first use.
fn stale_instant(ttl: Duration) -> Instant {
    Instant::now()
        .checked_sub(ttl.saturating_add(Duration::from_secs(1)))
        .unwrap_or_else(Instant::now)
}

enum FetchOutcome {
    NotModified,
    Updated { keyset: Jwks, etag: Option<String> },
}

async fn fetch_keyset(client: &Client, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
    let span = info_span!("oidc.jwks.fetch", http.method = "GET", url = %url);
    async {
        let mut request = client.get(url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("jwks fetch failed: {status}"));
        }

        let keyset = Jwks::from_json(&body).context("Invalid JWKS JSON")?;
        if keyset.rsa_key_count() == 0 {
            return Err(anyhow!("jwks contains no RSA keys"));
        }
        Ok(FetchOutcome::Updated { keyset, etag })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::testing::{sign_rs256, test_jwks, ISSUER, TEST_KID};
    use serde_json::json;

    const AUDIENCE: &str = "client-123";

    fn fresh_claims() -> serde_json::Value {
        let now = now_unix_seconds();
        json!({
            "iss": ISSUER,
            "sub": "subject-1",
            "aud": AUDIENCE,
            "iat": now - 5,
            "exp": now + 600,
            "email": "a@x.com",
        })
    }

    fn static_verifier() -> IdTokenVerifier {
        IdTokenVerifier::new(test_jwks(), vec![ISSUER.to_string()], AUDIENCE.to_string())
    }

    fn remote_verifier(cache: KeysetCache, last_refresh_unix: u64) -> IdTokenVerifier {
        IdTokenVerifier {
            // Port 9 (discard) on loopback: connections are refused immediately.
            keyset_source: KeysetSource::Remote {
                url: "http://127.0.0.1:9/jwks".to_string(),
                client: Client::new(),
            },
            keyset_cache: RwLock::new(cache),
            issuers: vec![ISSUER.to_string()],
            audience: AUDIENCE.to_string(),
            cache_ttl: Duration::from_secs(300),
            last_refresh_unix: AtomicU64::new(last_refresh_unix),
            last_failure_unix: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
        }
    }

    #[tokio::test]
    async fn static_verifier_accepts_valid_token() {
        let token = sign_rs256(TEST_KID, &fresh_claims());
        let claims = static_verifier().verify(&token).await;
        assert!(matches!(claims, Ok(ref c) if c.sub == "subject-1"), "{claims:?}");
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_kid_without_refresh() {
        let token = sign_rs256("other-key", &fresh_claims());
        let result = static_verifier().verify(&token).await;
        assert!(matches!(
            result,
            Err(Error::InvalidToken(jwt::Error::UnknownKid(_)))
        ));
    }

    #[tokio::test]
    async fn fresh_remote_cache_verifies_without_network() {
        let verifier = remote_verifier(
            KeysetCache {
                keyset: test_jwks(),
                fetched_at: Instant::now(),
                etag: None,
            },
            now_unix_seconds_u64(),
        );
        let token = sign_rs256(TEST_KID, &fresh_claims());
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn stale_cache_with_unreachable_provider_fails_closed() {
        let verifier = remote_verifier(
            KeysetCache {
                keyset: test_jwks(),
                fetched_at: stale_instant(Duration::from_secs(300)),
                etag: None,
            },
            0,
        );
        let token = sign_rs256(TEST_KID, &fresh_claims());
        let result = verifier.verify(&token).await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))), "{result:?}");
    }

    #[tokio::test]
    async fn unknown_kid_refresh_is_suppressed_within_cooldown() {
        let verifier = remote_verifier(
            KeysetCache {
                keyset: test_jwks(),
                fetched_at: Instant::now(),
                etag: None,
            },
            now_unix_seconds_u64(),
        );
        let refreshed = verifier.refresh_on_unknown_kid().await.map_err(|e| e.to_string());
        assert_eq!(refreshed, Ok(false));
    }

    #[tokio::test]
    async fn unknown_kid_with_unreachable_provider_is_unavailable() {
        let verifier = remote_verifier(
            KeysetCache {
                keyset: test_jwks(),
                fetched_at: Instant::now(),
                etag: None,
            },
            0,
        );
        let token = sign_rs256("rotated-key", &fresh_claims());
        let result = verifier.verify(&token).await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))), "{result:?}");
    }

    #[tokio::test]
    async fn keyset_status_reports_static_and_error() {
        assert_eq!(static_verifier().keyset_status().await, KeysetStatus::Static);

        let verifier = remote_verifier(
            KeysetCache {
                keyset: Jwks::default(),
                fetched_at: Instant::now(),
                etag: None,
            },
            0,
        );
        let status = verifier.keyset_status().await;
        assert_eq!(status, KeysetStatus::Error);
        assert!(!status.is_healthy());
        assert_eq!(status.as_str(), "error");
    }

    #[tokio::test]
    async fn fresh_cache_reports_ok_without_fetching() {
        // The provider URL is unreachable, so Ok proves no fetch happened.
        let verifier = remote_verifier(
            KeysetCache {
                keyset: test_jwks(),
                fetched_at: Instant::now(),
                etag: None,
            },
            now_unix_seconds_u64(),
        );
        for _ in 0..3 {
            assert_eq!(verifier.keyset_status().await, KeysetStatus::Ok);
        }
    }

    #[tokio::test]
    async fn failed_refresh_is_not_retried_immediately() {
        let verifier = remote_verifier(
            KeysetCache {
                keyset: Jwks::default(),
                fetched_at: stale_instant(Duration::from_secs(300)),
                etag: None,
            },
            0,
        );
        let token = sign_rs256(TEST_KID, &fresh_claims());

        let first = verifier.verify(&token).await;
        assert!(matches!(first, Err(Error::ProviderUnavailable(_))), "{first:?}");
        assert_ne!(verifier.last_failure_unix.load(Ordering::Relaxed), 0);

        let second = verifier.verify(&token).await;
        assert!(
            matches!(second, Err(Error::ProviderUnavailable(ref msg)) if msg.contains("recently")),
            "{second:?}"
        );
        assert_eq!(verifier.keyset_status().await, KeysetStatus::Error);
    }
}
