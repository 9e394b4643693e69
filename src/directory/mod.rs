//! User directory: one record per email address.
//!
//! Records are created on first login and never modified by later logins.

mod postgres;

pub use postgres::PgUserDirectory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub picture: String,
    /// Provider subject from the first login. Never serialized.
    #[serde(skip_serializing, default)]
    #[schema(ignore)]
    pub subject: String,
}

/// Identity data taken from verified provider claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub picture: String,
    pub subject: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Exact, case-sensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>>;

    /// Return the record for `new_user.email`, creating it if absent.
    ///
    /// Concurrent calls for the same email must all observe the same record,
    /// and an existing record is returned unchanged.
    async fn find_or_create(&self, new_user: &NewUser) -> Result<User>;

    /// Backing store reachability, for health reporting.
    async fn ping(&self) -> Result<()>;
}
