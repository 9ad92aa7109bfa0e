use crate::token::DEFAULT_SECRET_ENV;
use clap::{Arg, ArgMatches, Command};

pub const ARG_PUBLIC_BASE_URL: &str = "public-base-url";
pub const ARG_JWT_SECRET_ENV: &str = "jwt-secret-env";
pub const ARG_TOKEN_TTL_MINUTES: &str = "token-ttl-minutes";
pub const ARG_CONFIRMATION_TTL_SECONDS: &str = "confirmation-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_TENANT_TIMEOUT_SECONDS: &str = "tenant-timeout-seconds";

/// Token lifetimes above one week are rejected at parse time.
pub const MAX_TOKEN_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Confirmation links live at most 30 days.
pub const MAX_CONFIRMATION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Idle sessions live at most one day.
pub const MAX_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug)]
pub struct Options {
    pub public_base_url: String,
    pub jwt_secret_env: String,
    pub token_ttl_minutes: u64,
    pub confirmation_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
    pub tenant_timeout_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let read_u64 = |id: &str| -> anyhow::Result<u64> {
            matches
                .get_one::<u64>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            public_base_url: read_required(ARG_PUBLIC_BASE_URL)?,
            jwt_secret_env: read_required(ARG_JWT_SECRET_ENV)?,
            token_ttl_minutes: read_u64(ARG_TOKEN_TTL_MINUTES)?,
            confirmation_ttl_seconds: read_u64(ARG_CONFIRMATION_TTL_SECONDS)?,
            session_ttl_seconds: read_u64(ARG_SESSION_TTL_SECONDS)?,
            tenant_timeout_seconds: read_u64(ARG_TENANT_TIMEOUT_SECONDS)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_flow_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET_ENV)
                .long(ARG_JWT_SECRET_ENV)
                .help("Name of the environment variable holding the HS256 signing secret")
                .long_help(
                    "Name of the environment variable holding the HS256 signing secret. The variable is read on every issuance, so a rotated secret takes effect on redeploy.",
                )
                .env("WAGURI_JWT_SECRET_ENV")
                .default_value(DEFAULT_SECRET_ENV),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_MINUTES)
                .long(ARG_TOKEN_TTL_MINUTES)
                .help("Lifetime of issued tokens in minutes")
                .env("WAGURI_TOKEN_TTL_MINUTES")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_MINUTES)),
        )
}

fn with_flow_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_BASE_URL)
                .long(ARG_PUBLIC_BASE_URL)
                .help("Public base URL used for confirmation links")
                .env("WAGURI_PUBLIC_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_CONFIRMATION_TTL_SECONDS)
                .long(ARG_CONFIRMATION_TTL_SECONDS)
                .help("Confirmation link lifetime in seconds")
                .env("WAGURI_CONFIRMATION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_CONFIRMATION_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Idle lifetime of the browser session in seconds")
                .env("WAGURI_SESSION_TTL_SECONDS")
                .default_value("1200")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_TENANT_TIMEOUT_SECONDS)
                .long(ARG_TENANT_TIMEOUT_SECONDS)
                .help("Timeout for the tenant user push")
                .env("WAGURI_TENANT_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
