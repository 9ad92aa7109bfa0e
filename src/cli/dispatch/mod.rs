//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail, ARG_DSN, ARG_PORT, ARG_PROJECTS_FILE};
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .filter(|v| !v.trim().is_empty());
    let projects_file = matches
        .get_one::<String>(ARG_PROJECTS_FILE)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    if dsn.is_none() && projects_file.is_none() {
        return Err(anyhow!(
            "missing required argument: --{ARG_DSN} or --{ARG_PROJECTS_FILE}"
        ));
    }

    let auth_opts = auth::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        projects_file,
        public_base_url: auth_opts.public_base_url,
        jwt_secret_env: auth_opts.jwt_secret_env,
        token_ttl_minutes: auth_opts.token_ttl_minutes,
        confirmation_ttl_seconds: auth_opts.confirmation_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        tenant_timeout_seconds: auth_opts.tenant_timeout_seconds,
        mail_relay_url: mail_opts.relay_url,
        mail_relay_token: mail_opts.relay_token,
        mail_from: mail_opts.from_email,
        mail_from_name: mail_opts.from_name,
        mail_timeout_seconds: mail_opts.timeout_seconds,
    }))
}
