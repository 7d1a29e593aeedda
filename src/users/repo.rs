use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AuthError;
use crate::users::repo_types::{NewUser, ProfileChanges, User, UserId};

/// Data-access contract the workflows rely on.
///
/// Updates are single-record compare-and-set operations: they return
/// `Ok(None)` when the row no longer matches the expected state, which the
/// callers treat as a lost race.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>>;

    /// Lookup is case-insensitive.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Fails with [`AuthError::DuplicateEmail`] when the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, AuthError>;

    /// Sets `confirmed = true` (and the hash, when given) only while the
    /// user is still unconfirmed.
    async fn confirm(&self, id: UserId, password_hash: Option<&str>)
        -> anyhow::Result<Option<User>>;

    /// Replaces the hash only while the stored one still equals `expected`.
    async fn set_password_hash(
        &self,
        id: UserId,
        new_hash: &str,
        expected: Option<&str>,
    ) -> anyhow::Result<Option<User>>;

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>>;

    async fn count(&self) -> anyhow::Result<i64>;
}

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, hash, confirmed, admin, metadata, created_at";

/// PostgreSQL-backed directory.
#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, first_name, last_name, hash, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.metadata.map(serde_json::Value::Object))
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(AuthError::DuplicateEmail),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn confirm(
        &self,
        id: UserId,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET confirmed = TRUE,
                   hash = COALESCE($2, hash)
             WHERE id = $1 AND confirmed = FALSE
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .context("confirm user")?;
        Ok(user)
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        new_hash: &str,
        expected: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET hash = $2
             WHERE id = $1 AND hash IS NOT DISTINCT FROM $3
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(new_hash)
        .bind(expected)
        .fetch_optional(&self.db)
        .await
        .context("set password hash")?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET first_name = COALESCE($2, first_name),
                   last_name = COALESCE($3, last_name),
                   metadata = COALESCE($4, metadata)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.metadata.map(serde_json::Value::Object))
        .fetch_optional(&self.db)
        .await
        .context("update profile")?;
        Ok(user)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .context("count users")?;
        Ok(count)
    }
}
