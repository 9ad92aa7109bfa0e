use super::{
    check_password_policy, normalize_email,
    utils::{generate_email_token, hash_email_token, hash_password, verify_password_hash},
    CreateUserError, IdentityStore, NewUser, User,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

struct StoredUser {
    user: User,
    password_hash: String,
}

struct PendingToken {
    user_id: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, StoredUser>,
    emails: HashMap<String, Uuid>,
    tokens: HashMap<Vec<u8>, PendingToken>,
}

/// In-process identity store for local development and tests.
pub struct MemoryIdentityStore {
    confirmation_ttl: Duration,
    inner: Mutex<Inner>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new(confirmation_ttl: Duration) -> Self {
        Self {
            confirmation_ttl,
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_user(
        &self,
        new_user: NewUser,
        password: &SecretString,
    ) -> Result<User, CreateUserError> {
        check_password_policy(password.expose_secret())?;
        let email = normalize_email(&new_user.email);

        if self.inner.lock().await.emails.contains_key(&email) {
            return Err(CreateUserError::DuplicateEmail);
        }

        // Hashed without the lock held; the email is checked again before insert.
        let password_hash = hash_password(password.clone()).await?;

        let mut inner = self.inner.lock().await;
        if inner.emails.contains_key(&email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email_confirmed: false,
            project_id: new_user.project_id,
        };
        inner.emails.insert(email, user.id);
        inner.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).map(|stored| stored.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .emails
            .get(&normalize_email(email))
            .and_then(|id| inner.users.get(id))
            .map(|stored| stored.user.clone()))
    }

    async fn verify_password(&self, user_id: Uuid, password: &SecretString) -> Result<bool> {
        let hash = {
            let inner = self.inner.lock().await;
            match inner.users.get(&user_id) {
                Some(stored) => stored.password_hash.clone(),
                None => return Ok(false),
            }
        };
        verify_password_hash(hash, password.clone()).await
    }

    async fn generate_email_token(&self, user: &User) -> Result<String> {
        let token = generate_email_token()?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(self.confirmation_ttl)
            .context("confirmation ttl is out of range")?;

        let mut inner = self.inner.lock().await;
        inner.tokens.retain(|_, pending| pending.expires_at > now);
        inner.tokens.insert(
            hash_email_token(&token),
            PendingToken {
                user_id: user.id,
                expires_at,
            },
        );
        Ok(token)
    }

    async fn confirm_email(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let key = hash_email_token(token);

        let live = inner
            .tokens
            .get(&key)
            .is_some_and(|pending| pending.user_id == user_id && pending.expires_at > Instant::now());
        if !live {
            debug!("Confirmation token is unknown, expired or for another user");
            return Ok(false);
        }

        let Some(stored) = inner.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if stored.user.email_confirmed {
            return Ok(false);
        }
        stored.user.email_confirmed = true;

        // Confirming kills every outstanding token for the account.
        inner.tokens.retain(|_, pending| pending.user_id != user_id);
        Ok(true)
    }
}
