//! Shared HTTP state and cookie configuration.

use crate::flow::AuthFlow;
use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 20 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: u64,
    secure_cookies: bool,
}

impl AuthConfig {
    /// Cookies are marked `Secure` when the public base URL is https.
    #[must_use]
    pub fn new(public_base_url: &str) -> Self {
        let secure_cookies = public_base_url.starts_with("https://");
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            secure_cookies,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }
}

pub struct AuthState {
    flow: AuthFlow,
    sessions: Arc<dyn SessionStore>,
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(flow: AuthFlow, sessions: Arc<dyn SessionStore>, config: AuthConfig) -> Self {
        Self {
            flow,
            sessions,
            config,
        }
    }

    #[must_use]
    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
