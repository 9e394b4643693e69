//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use super::{error::AuthError, utils::valid_email};
use crate::{directory::NewUser, oidc::IdTokenClaims};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UrlResponse {
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    #[serde(rename = "Token")]
    pub token: String,
}

/// Generic error body; details only go to the logs.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub(super) fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code issued by the provider.
    pub code: Option<String>,
    /// State value echoed back by the provider.
    pub state: Option<String>,
}

/// Map verified claims onto the directory's input.
///
/// `email` is required; `name` and `picture` are optional but must be
/// strings when present.
pub(super) fn identity_from_claims(claims: &IdTokenClaims) -> Result<NewUser, AuthError> {
    let email = match claims.claim("email") {
        Some(Value::String(email)) if valid_email(email) => email.clone(),
        Some(Value::String(_)) => {
            return Err(AuthError::MalformedClaims("invalid email".to_string()))
        }
        Some(_) => return Err(AuthError::MalformedClaims("email is not a string".to_string())),
        None => return Err(AuthError::MalformedClaims("missing email".to_string())),
    };

    if claims.sub.trim().is_empty() {
        return Err(AuthError::MalformedClaims("missing sub".to_string()));
    }

    Ok(NewUser {
        name: optional_string_claim(claims, "name")?,
        email,
        picture: optional_string_claim(claims, "picture")?,
        subject: claims.sub.clone(),
    })
}

fn optional_string_claim(claims: &IdTokenClaims, name: &str) -> Result<String, AuthError> {
    match claims.claim(name) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(AuthError::MalformedClaims(format!("{name} is not a string"))),
    }
}
