//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, currently always the
//! API server with its provider and database configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::oauth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let request_timeout_seconds = matches
        .get_one::<u64>("request-timeout-seconds")
        .copied()
        .unwrap_or(30);

    let oauth_opts = oauth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        request_timeout_seconds,
        issuer_url: oauth_opts.issuer_url,
        client_id: oauth_opts.client_id,
        client_secret: oauth_opts.client_secret,
        redirect_url: oauth_opts.redirect_url,
        provider: oauth_opts.provider,
        scopes: oauth_opts.scopes,
        state_cookie_ttl_seconds: oauth_opts.state_cookie_ttl_seconds,
        jwks_cache_ttl_seconds: oauth_opts.jwks_cache_ttl_seconds,
        http_timeout_seconds: oauth_opts.http_timeout_seconds,
    }))
}
