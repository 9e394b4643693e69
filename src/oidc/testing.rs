//! Fixed RSA key and signing helpers for verifier tests.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::OnceLock;

use super::jwks::{Jwk, Jwks};

pub(crate) const ISSUER: &str = "https://accounts.example.test";
pub(crate) const TEST_KID: &str = "test-key";

const TEST_PRIVATE_KEY_PEM: &str = include_str!("../../tests/fixtures/rsa_test_key.pem");

fn private_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::from_pkcs8_pem(TEST_PRIVATE_KEY_PEM.trim())
            .unwrap_or_else(|e| panic!("test key must parse: {e}"))
    })
}

pub(crate) fn test_jwks() -> Jwks {
    let public_key = RsaPublicKey::from(private_key());
    Jwks {
        keys: vec![Jwk::from_rsa_public_key(&public_key, TEST_KID)],
    }
}

/// Sign `claims` as an RS256 JWT with the fixed test key, tagging it with `kid`.
pub(crate) fn sign_rs256(kid: &str, claims: &Value) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT", "kid": kid});
    let header_b64 = Base64UrlUnpadded::encode_string(header.to_string().as_bytes());
    let claims_b64 = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = SigningKey::<Sha256>::new(private_key().clone());
    let signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

    format!("{signing_input}.{signature_b64}")
}
