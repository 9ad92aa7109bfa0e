//! Per-browser-session project binding.
//!
//! The binding is an explicit value: flow operations receive a
//! [`SessionContext`] and hand back a new one, the HTTP layer persists it in a
//! [`SessionStore`] keyed by the session cookie.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const SESSION_COOKIE_NAME: &str = "waguri_session";

/// Resolved tenant for one browser session. All fields are always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionBinding {
    pub project_id: String,
    pub client_url: String,
    pub api_url: String,
}

/// Either fully unbound or fully bound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    binding: Option<SessionBinding>,
}

impl SessionContext {
    #[must_use]
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Return a context bound to the given project, replacing any previous binding.
    #[must_use]
    pub fn bind(
        self,
        project_id: impl Into<String>,
        client_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            binding: Some(SessionBinding {
                project_id: project_id.into(),
                client_url: client_url.into(),
                api_url: api_url.into(),
            }),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    #[must_use]
    pub fn binding(&self) -> Option<&SessionBinding> {
        self.binding.as_ref()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the context for a raw session token; unknown or expired tokens are unbound.
    async fn load(&self, token: &str) -> SessionContext;

    /// Persist the context for a raw session token.
    async fn save(&self, token: &str, context: SessionContext);
}

struct SessionEntry {
    context: SessionContext,
    touched_at: Instant,
}

/// In-process store with a sliding idle TTL.
///
/// Keys are SHA-256 hashes of the cookie value; the raw token is never kept.
pub struct MemorySessionStore {
    ttl: Duration,
    entries: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> SessionContext {
        let key = hash_session_token(token);
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&key) {
            Some(entry) if entry.touched_at.elapsed() < self.ttl => {
                entry.touched_at = Instant::now();
                entry.context.clone()
            }
            Some(_) => {
                entries.remove(&key);
                SessionContext::unbound()
            }
            None => SessionContext::unbound(),
        }
    }

    async fn save(&self, token: &str, context: SessionContext) {
        let key = hash_session_token(token);
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.touched_at.elapsed() < self.ttl);
        entries.insert(
            key,
            SessionEntry {
                context,
                touched_at: Instant::now(),
            },
        );
    }
}

/// Create a new random session token for the cookie.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Read the session token from the `Cookie` header, if any.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(SESSION_COOKIE_NAME), Some(val)) = (key, val) {
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

/// Build the `HttpOnly` session cookie.
///
/// # Errors
/// Returns an error if the token contains bytes not allowed in a header.
pub fn session_cookie(
    token: &str,
    ttl: Duration,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
