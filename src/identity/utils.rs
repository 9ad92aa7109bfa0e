//! Helpers shared by the identity stores.

use anyhow::{Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;

/// Argon2id hash with the default parameters that matches no password. Unknown
/// accounts are verified against it so a login costs the same either way.
const UNKNOWN_USER_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

fn hash_password_blocking(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .context("failed to generate password salt")?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_password_blocking(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Hash on the blocking pool; Argon2 is too slow for a runtime worker.
pub(super) async fn hash_password(password: SecretString) -> Result<String> {
    spawn_blocking(move || hash_password_blocking(password.expose_secret()))
        .await
        .context("password hashing task failed")?
}

pub(super) async fn verify_password_hash(hash: String, password: SecretString) -> Result<bool> {
    spawn_blocking(move || verify_password_blocking(&hash, password.expose_secret()))
        .await
        .context("password verification task failed")
}

/// Spend one Argon2 verification on a login for an unknown email.
///
/// # Errors
/// Returns an error if the blocking task cannot complete.
pub async fn verify_unknown_user(password: &SecretString) -> Result<()> {
    let matched = verify_password_hash(UNKNOWN_USER_HASH.to_string(), password.clone()).await?;
    debug_assert!(!matched);
    Ok(())
}

/// Random confirmation token; only its hash is kept server-side.
pub(super) fn generate_email_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate confirmation token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(super) fn hash_email_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
