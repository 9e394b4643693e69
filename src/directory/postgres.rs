use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgExecutor, PgPool, Row};
use tracing::{debug, info_span, warn, Instrument};

use super::{NewUser, User, UserDirectory};

const SELECT_BY_EMAIL: &str =
    "SELECT id, name, email, picture, oidc_subject FROM users WHERE email = $1";

const SELECT_BY_SUBJECT: &str = r"
    SELECT id, name, email, picture, oidc_subject
    FROM users
    WHERE oidc_subject = $1
    ORDER BY created_at
    LIMIT 1
";

const INSERT_USER: &str = r"
    INSERT INTO users
        (name, email, picture, oidc_subject)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (email) DO NOTHING
    RETURNING id, name, email, picture, oidc_subject
";

/// [`UserDirectory`] stored in the `users` table.
#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_or_create_in_tx(&self, new_user: &NewUser) -> Result<User, FindOrCreateError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin find-or-create transaction")?;

        if let Some(user) = select_user(&mut *tx, SELECT_BY_EMAIL, &new_user.email).await? {
            tx.commit().await.context("commit find-or-create transaction")?;
            return Ok(user);
        }

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = INSERT_USER
        );
        let inserted = sqlx::query(INSERT_USER)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.picture)
            .bind(&new_user.subject)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await;

        let user = match inserted {
            Ok(Some(row)) => user_from_row(&row).context("failed to decode inserted user")?,
            // Lost the race; the winner's row is committed and visible now.
            Ok(None) => select_user(&mut *tx, SELECT_BY_EMAIL, &new_user.email)
                .await?
                .context("user vanished after conflicting insert")?,
            Err(err) => {
                let err = classify_insert_error(err);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "failed to roll back find-or-create transaction");
                }
                return Err(err);
            }
        };

        tx.commit().await.context("commit find-or-create transaction")?;
        Ok(user)
    }
}

#[derive(Debug)]
enum FindOrCreateError {
    /// A unique constraint other than `email` rejected the insert.
    Conflict,
    Other(anyhow::Error),
}

impl From<anyhow::Error> for FindOrCreateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        select_user(&self.pool, SELECT_BY_EMAIL, email).await
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>> {
        select_user(&self.pool, SELECT_BY_SUBJECT, subject).await
    }

    async fn find_or_create(&self, new_user: &NewUser) -> Result<User> {
        match self.find_or_create_in_tx(new_user).await {
            Ok(user) => Ok(user),
            Err(FindOrCreateError::Conflict) => {
                warn!(
                    "unique violation on a constraint other than email; reading existing record by email"
                );
                select_user(&self.pool, SELECT_BY_EMAIL, &new_user.email)
                    .await?
                    .context("user missing after unique violation")
            }
            Err(FindOrCreateError::Other(err)) => Err(err),
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")?;
        debug!("database connection is healthy");
        Ok(())
    }
}

async fn select_user<'e, E>(executor: E, query: &'static str, value: &str) -> Result<Option<User>>
where
    E: PgExecutor<'e>,
{
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(value)
        .fetch_optional(executor)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("failed to decode user")
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        picture: row.try_get("picture")?,
        subject: row.try_get("oidc_subject")?,
    })
}

fn classify_insert_error(err: sqlx::Error) -> FindOrCreateError {
    if is_unique_violation(&err) {
        FindOrCreateError::Conflict
    } else {
        FindOrCreateError::Other(anyhow::Error::new(err).context("failed to insert user"))
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23503"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError { code: None }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn insert_errors_are_classified() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(
            classify_insert_error(err),
            FindOrCreateError::Conflict
        ));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23502"),
        }));
        match classify_insert_error(err) {
            FindOrCreateError::Other(err) => {
                assert_eq!(err.to_string(), "failed to insert user");
            }
            FindOrCreateError::Conflict => panic!("not-null violation is not a conflict"),
        }

        assert!(matches!(
            classify_insert_error(sqlx::Error::PoolTimedOut),
            FindOrCreateError::Other(_)
        ));
    }

    #[test]
    fn queries_match_on_exact_email() {
        assert!(SELECT_BY_EMAIL.contains("WHERE email = $1"));
        assert!(!SELECT_BY_EMAIL.to_lowercase().contains("lower("));
        assert!(INSERT_USER.contains("ON CONFLICT (email) DO NOTHING"));
    }
}
