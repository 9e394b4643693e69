use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::jwt::Error;

/// JSON Web Key Set as published at the provider's `jwks_uri`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid JSON or doesn't match the expected JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Find a signing key by `kid` (Key ID).
    ///
    /// Keys explicitly marked for encryption (`use: enc`) are ignored.
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .filter(|k| k.key_use.as_deref() != Some("enc"))
            .find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Number of RSA keys usable for RS256 verification.
    #[must_use]
    pub fn rsa_key_count(&self) -> usize {
        self.keys.iter().filter(|k| k.kty == "RSA").count()
    }
}

/// A single key. Providers publish non-RSA keys too, so `n`/`e` are optional
/// and only checked when the key is actually used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey`.
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: Some(kid.into()),
            n: Some(n),
            e: Some(e),
        }
    }

    /// Convert this JWK to an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not RSA, is pinned to another algorithm,
    /// or the modulus/exponent cannot be decoded.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        if self.kty != "RSA" {
            return Err(Error::InvalidKeyType(self.kty.clone()));
        }
        if let Some(alg) = self.alg.as_deref() {
            if alg != "RS256" {
                return Err(Error::UnsupportedAlg(alg.to_string()));
            }
        }
        let n = self.n.as_deref().ok_or(Error::KeyParse)?;
        let e = self.e.as_deref().ok_or(Error::KeyParse)?;
        let n_bytes = Base64UrlUnpadded::decode_vec(n).map_err(|_| Error::Base64)?;
        let e_bytes = Base64UrlUnpadded::decode_vec(e).map_err(|_| Error::Base64)?;
        RsaPublicKey::new(
            BigUint::from_bytes_be(&n_bytes),
            BigUint::from_bytes_be(&e_bytes),
        )
        .map_err(Error::Rsa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOGLE_STYLE_JWKS: &str = r#"{
        "keys": [
            {"kty": "RSA", "alg": "RS256", "use": "sig", "kid": "a1", "n": "sXch", "e": "AQAB"},
            {"kty": "RSA", "use": "enc", "kid": "enc-1", "n": "sXch", "e": "AQAB"},
            {"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "f83O", "y": "x_FE"}
        ]
    }"#;

    #[test]
    fn parses_mixed_key_types() {
        let jwks = Jwks::from_json(GOOGLE_STYLE_JWKS).map_err(|e| e.to_string());
        assert!(jwks.is_ok());
        if let Ok(jwks) = jwks {
            assert_eq!(jwks.keys.len(), 3);
            assert_eq!(jwks.rsa_key_count(), 2);
        }
    }

    #[test]
    fn find_by_kid_skips_encryption_keys() {
        let Ok(jwks) = Jwks::from_json(GOOGLE_STYLE_JWKS) else {
            panic!("fixture must parse");
        };
        assert!(jwks.find_by_kid("a1").is_some());
        assert!(jwks.find_by_kid("enc-1").is_none());
        assert!(jwks.find_by_kid("missing").is_none());
    }

    #[test]
    fn non_rsa_key_is_rejected() {
        let Ok(jwks) = Jwks::from_json(GOOGLE_STYLE_JWKS) else {
            panic!("fixture must parse");
        };
        let ec = jwks.find_by_kid("ec-1");
        assert!(matches!(
            ec.map(Jwk::to_rsa_public_key),
            Some(Err(Error::InvalidKeyType(_)))
        ));
    }

    #[test]
    fn key_pinned_to_other_alg_is_rejected() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            alg: Some("RS512".to_string()),
            key_use: None,
            kid: Some("k".to_string()),
            n: Some("sXch".to_string()),
            e: Some("AQAB".to_string()),
        };
        assert!(matches!(
            jwk.to_rsa_public_key(),
            Err(Error::UnsupportedAlg(alg)) if alg == "RS512"
        ));
    }
}
