//! # idgate
//!
//! `idgate` signs end users in through an external OpenID Connect provider and
//! gates API access on the identity token it hands back.
//!
//! ## Login flow
//!
//! OAuth 2.0 authorization-code flow with a `state` cookie. On callback the
//! code is exchanged, the identity token is verified against the provider's
//! published keys (RS256, issuer, audience, expiry), and the caller's email is
//! resolved to a local user record, created on first login. The verified
//! identity token is returned as the session credential.
//!
//! ## User records
//!
//! One record per email address. Concurrent first logins converge on a single
//! row, and later logins never rewrite name, picture, or subject.
//!
//! ## Access gate
//!
//! Protected routes require `Authorization: Bearer <identity token>`. Tokens
//! are verified locally against cached signing keys; when keys cannot be
//! obtained the gate rejects the request.

pub mod api;
pub mod cli;
pub mod directory;
pub mod oidc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
