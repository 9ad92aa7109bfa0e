//! Tenant-scoped bearer tokens.
//!
//! Audience and issuer are per-call parameters: every tenant receives a token
//! scoped to its own `api_url`. The HMAC secret is read from its source on
//! every issuance so a redeploy with a rotated secret takes effect at once.

use crate::identity::User;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub const DEFAULT_SECRET_ENV: &str = "WAGURI_JWT_SECRET";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("failed to sign token")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub email_confirmed: bool,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Where the HMAC secret comes from.
#[derive(Clone, Debug)]
pub enum SigningSecret {
    /// Read the named environment variable at every issuance.
    Env(String),
    /// Fixed secret material, used by tests and embedders.
    Fixed(SecretString),
}

impl SigningSecret {
    /// Current secret value; empty values count as missing.
    ///
    /// # Errors
    /// Returns [`TokenError::MissingSecret`] if no usable secret is available.
    pub fn current(&self) -> Result<SecretString, TokenError> {
        let secret = match self {
            Self::Env(name) => std::env::var(name)
                .map(SecretString::from)
                .map_err(|_| TokenError::MissingSecret)?,
            Self::Fixed(secret) => secret.clone(),
        };
        if secret.expose_secret().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(secret)
    }
}

#[derive(Clone, Debug)]
pub struct TokenIssuer {
    secret: SigningSecret,
    ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: SigningSecret, ttl_minutes: u64) -> Self {
        Self {
            secret,
            ttl: Duration::from_secs(ttl_minutes.saturating_mul(60)),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn secret(&self) -> &SigningSecret {
        &self.secret
    }

    /// Mint a signed HS256 token for `user`, scoped to one tenant.
    ///
    /// # Errors
    /// Returns an error if the secret is missing or signing fails.
    pub fn issue(&self, user: &User, audience: &str, issuer: &str) -> Result<String, TokenError> {
        let secret = self.secret.current()?;
        let iat = now_unix_seconds();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            email_confirmed: user.email_confirmed,
            aud: audience.to_string(),
            iss: issuer.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };
        let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &key,
        )?)
    }
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
