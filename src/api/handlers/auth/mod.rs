//! OAuth 2.0 / OpenID Connect login flow and the access gate.
//!
//! ## Login
//!
//! `GET /auth/login` generates a random state value, stores it in the
//! `oauthstate` cookie, and redirects to the provider's consent page. The
//! provider sends the browser back to `GET /auth/{provider}/callback` with
//! `code` and `state`; the callback checks the state against the cookie,
//! exchanges the code, verifies the identity token, finds or creates the local
//! user by email, and returns the verified identity token as `{"Token": ...}`.
//!
//! ## Protected routes
//!
//! `GET /auth/url` and `GET /auth/user` sit behind [`require_credential`],
//! which verifies `Authorization: Bearer <identity token>` against locally
//! cached provider keys.
//!
//! Failures return a generic JSON body; details are only logged.

pub(crate) mod callback;
mod error;
pub(crate) mod gate;
pub(crate) mod login;
mod state;
pub(crate) mod types;
pub(crate) mod user;
mod utils;

pub use error::AuthError;
pub use gate::{require_credential, AuthenticatedIdentity};
pub use state::{AuthConfig, AuthState};
