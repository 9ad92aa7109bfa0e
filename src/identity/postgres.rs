use super::{
    check_password_policy, normalize_email,
    utils::{generate_email_token, hash_email_token, hash_password, verify_password_hash},
    CreateUserError, IdentityStore, NewUser, User,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Identity store backed by the `users` and `email_confirmations` tables.
#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
    confirmation_ttl_seconds: i64,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool, confirmation_ttl: Duration) -> Self {
        Self {
            pool,
            confirmation_ttl_seconds: i64::try_from(confirmation_ttl.as_secs())
                .unwrap_or(i64::MAX),
        }
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email_confirmed: row.get("email_confirmed"),
        project_id: row.get("project_id"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_user(
        &self,
        new_user: NewUser,
        password: &SecretString,
    ) -> Result<User, CreateUserError> {
        check_password_policy(password.expose_secret())?;
        let password_hash = hash_password(password.clone()).await?;

        let query = r"
            INSERT INTO users
                (id, email, first_name, last_name, password_hash, project_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, first_name, last_name, email_confirmed, project_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(normalize_email(&new_user.email))
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(password_hash)
            .bind(&new_user.project_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(user_from_row(&row)),
            Err(err) if is_unique_violation(&err) => Err(CreateUserError::DuplicateEmail),
            Err(err) => Err(CreateUserError::Store(
                anyhow::Error::new(err).context("failed to insert user"),
            )),
        }
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, first_name, last_name, email_confirmed, project_id
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, first_name, last_name, email_confirmed, project_id
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn verify_password(&self, user_id: Uuid, password: &SecretString) -> Result<bool> {
        let query = "SELECT password_hash FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup password hash")?;

        match row {
            Some(row) => verify_password_hash(row.get("password_hash"), password.clone()).await,
            None => Ok(false),
        }
    }

    async fn generate_email_token(&self, user: &User) -> Result<String> {
        // Only the hash is stored; the raw token goes into the mail link.
        let token = generate_email_token()?;
        let query = r"
            INSERT INTO email_confirmations
                (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .bind(hash_email_token(&token))
            .bind(self.confirmation_ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert confirmation token")?;
        Ok(token)
    }

    async fn confirm_email(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin confirmation transaction")?;

        let query = r"
            UPDATE email_confirmations
            SET consumed_at = NOW()
            WHERE token_hash = $1
              AND user_id = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let consumed = sqlx::query(query)
            .bind(hash_email_token(token))
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume confirmation token")?;
        if consumed.is_none() {
            let _ = tx.rollback().await;
            return Ok(false);
        }

        let query = r"
            UPDATE users
            SET email_confirmed = TRUE,
                updated_at = NOW()
            WHERE id = $1
              AND email_confirmed = FALSE
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let confirmed = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to confirm user")?;
        if confirmed.is_none() {
            let _ = tx.rollback().await;
            return Ok(false);
        }

        let query = r"
            UPDATE email_confirmations
            SET consumed_at = NOW()
            WHERE user_id = $1
              AND consumed_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to retire outstanding tokens")?;

        tx.commit()
            .await
            .context("commit confirmation transaction")?;
        Ok(true)
    }
}
