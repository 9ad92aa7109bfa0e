//! # Waguri (multi-tenant authentication gateway)
//!
//! `waguri` authenticates end users on behalf of downstream client
//! applications ("projects"). Every browser session is bound to exactly one
//! project before any state-changing step is allowed, and every token it mints
//! is scoped to that project.
//!
//! ## Tenant binding
//!
//! A login starts at `/auth/login/{project_id}`. The project id is resolved
//! against the [`directory`] to a `client_url` / `api_url` pair and stored in
//! the session. A session without a binding is treated as expired.
//!
//! ## Tokens
//!
//! Successful logins redirect to `{api_url}/login/{token}` where the token is
//! an HS256 JWT with `aud` and `iss` set to the tenant `api_url`. A token
//! minted for one tenant is useless to another.
//!
//! ## Signup and confirmation
//!
//! New accounts stay pending until the one-time link mailed by the
//! [`confirmation`] service is visited. Confirmed accounts are pushed to the
//! tenant backend at `{api_url}/user/create`. Mail and tenant failures are
//! terminal and surface as the single failure page.

pub mod api;
pub mod cli;
pub mod confirmation;
pub mod directory;
pub mod flow;
pub mod identity;
pub mod mail;
pub mod notifier;
pub mod session;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
