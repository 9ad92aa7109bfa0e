//! Identity store boundary.
//!
//! User creation, password verification and email-token bookkeeping live
//! behind [`IdentityStore`]. The flow only ever sees the canonical [`User`]
//! projection.

mod memory;
mod postgres;
mod utils;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;
pub use utils::{normalize_email, valid_email, verify_unknown_user};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum password length accepted by the bundled stores.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Canonical user projection shared by every collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub email_confirmed: bool,
    pub project_id: String,
}

/// Fields required to create a pending account.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub project_id: String,
}

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("password rejected: {}", .0.join(", "))]
    Rejected(Vec<String>),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create an unconfirmed account. Email uniqueness is enforced here.
    async fn create_user(
        &self,
        new_user: NewUser,
        password: &SecretString,
    ) -> Result<User, CreateUserError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn verify_password(&self, user_id: Uuid, password: &SecretString) -> Result<bool>;

    /// Issue a one-time, time-limited email confirmation token.
    async fn generate_email_token(&self, user: &User) -> Result<String>;

    /// Consume `token` and confirm the account.
    ///
    /// Returns `Ok(false)` for unknown, expired or consumed tokens and for
    /// accounts that are already confirmed.
    async fn confirm_email(&self, user_id: Uuid, token: &str) -> Result<bool>;
}

/// Password rules shared by the bundled stores.
pub(crate) fn check_password_policy(password: &str) -> Result<(), CreateUserError> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("password must contain a digit".to_string());
    }
    if !password.chars().any(char::is_alphabetic) {
        problems.push("password must contain a letter".to_string());
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CreateUserError::Rejected(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy_accepts_reasonable_passwords() {
        assert!(check_password_policy("correct-horse-42").is_ok());
    }

    #[test]
    fn password_policy_lists_every_problem() {
        match check_password_policy("abc") {
            Err(CreateUserError::Rejected(problems)) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("at least 8"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
