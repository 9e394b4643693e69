//! RS256 identity token decoding and claim validation.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::errors::Error as RsaError;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

use super::jwks::Jwks;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("missing key id")]
    MissingKid,
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid key type: {0}")]
    InvalidKeyType(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),
    #[error("invalid audience")]
    InvalidAudience,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(auds) => auds.len(),
        }
    }
}

/// Registered claims of an OIDC identity token. Everything else (email, name,
/// picture, ...) lands in `extra` and is interpreted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdTokenClaims {
    /// Look up a non-registered claim.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// Expectations a token must meet besides a valid signature.
#[derive(Debug, Clone, Copy)]
pub struct Validation<'a> {
    pub issuers: &'a [String],
    pub audience: &'a str,
    pub now_unix_seconds: i64,
    pub leeway_seconds: i64,
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

struct Segments<'a> {
    header: &'a str,
    claims: &'a str,
    signature: &'a str,
}

fn split(token: &str) -> Result<Segments<'_>, Error> {
    let mut parts = token.trim().split('.');
    let header = parts.next().ok_or(Error::TokenFormat)?;
    let claims = parts.next().ok_or(Error::TokenFormat)?;
    let signature = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() || header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(Error::TokenFormat);
    }
    Ok(Segments {
        header,
        claims,
        signature,
    })
}

/// Decode the header without checking anything else.
///
/// # Errors
///
/// Returns an error if the token is not three base64url JSON segments.
pub fn decode_header(token: &str) -> Result<JwtHeader, Error> {
    let segments = split(token)?;
    b64d_json(segments.header)
}

/// Verify an RS256 identity token against `jwks` and return its claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the algorithm is not RS256 or the `kid` is missing/unknown,
/// - the signature is invalid,
/// - the claims fail validation (`iss`, `aud`, `exp`, `iat`, `nbf`).
pub fn verify_rs256(
    token: &str,
    jwks: &Jwks,
    validation: &Validation<'_>,
) -> Result<IdTokenClaims, Error> {
    let segments = split(token)?;

    let header: JwtHeader = b64d_json(segments.header)?;
    if header.alg != "RS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }
    let kid = header.kid.ok_or(Error::MissingKid)?;
    let jwk = jwks
        .find_by_kid(&kid)
        .ok_or_else(|| Error::UnknownKid(kid.clone()))?;

    let verifying_key = VerifyingKey::<Sha256>::new(jwk.to_rsa_public_key()?);
    let signing_input = format!("{}.{}", segments.header, segments.claims);
    let signature_bytes =
        Base64UrlUnpadded::decode_vec(segments.signature).map_err(|_| Error::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: IdTokenClaims = b64d_json(segments.claims)?;
    validate_claims(&claims, validation)?;

    Ok(claims)
}

fn validate_claims(claims: &IdTokenClaims, validation: &Validation<'_>) -> Result<(), Error> {
    if !validation.issuers.iter().any(|iss| *iss == claims.iss) {
        return Err(Error::InvalidIssuer(claims.iss.clone()));
    }
    if !claims.aud.contains(validation.audience) {
        return Err(Error::InvalidAudience);
    }
    // With several audiences the authorized party has to be us.
    if claims.aud.len() > 1 {
        if let Some(azp) = claims.azp.as_deref() {
            if azp != validation.audience {
                return Err(Error::InvalidAudience);
            }
        }
    }

    let now = validation.now_unix_seconds;
    let leeway = validation.leeway_seconds;
    if claims.exp.saturating_add(leeway) <= now {
        return Err(Error::Expired);
    }
    if claims.iat.saturating_sub(leeway) > now {
        return Err(Error::NotYetValid);
    }
    if let Some(nbf) = claims.nbf {
        if nbf.saturating_sub(leeway) > now {
            return Err(Error::NotYetValid);
        }
    }

    Ok(())
}
