use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_MAIL_RELAY_URL: &str = "mail-relay-url";
pub const ARG_MAIL_RELAY_TOKEN: &str = "mail-relay-token";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_FROM_NAME: &str = "mail-from-name";
pub const ARG_MAIL_TIMEOUT_SECONDS: &str = "mail-timeout-seconds";

#[derive(Debug)]
pub struct Options {
    /// `None` logs messages instead of delivering them.
    pub relay_url: Option<String>,
    pub relay_token: Option<SecretString>,
    pub from_email: String,
    pub from_name: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse mail relay arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the sender address is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let from_email = get_non_empty(ARG_MAIL_FROM)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_MAIL_FROM}"))?;

        Ok(Self {
            relay_url: get_non_empty(ARG_MAIL_RELAY_URL),
            relay_token: get_non_empty(ARG_MAIL_RELAY_TOKEN).map(SecretString::from),
            from_email,
            from_name: get_non_empty(ARG_MAIL_FROM_NAME).unwrap_or_default(),
            timeout_seconds: matches
                .get_one::<u64>(ARG_MAIL_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_RELAY_URL)
                .long(ARG_MAIL_RELAY_URL)
                .help("HTTP mail relay endpoint; confirmation mail is only logged when unset")
                .env("WAGURI_MAIL_RELAY_URL"),
        )
        .arg(
            Arg::new(ARG_MAIL_RELAY_TOKEN)
                .long(ARG_MAIL_RELAY_TOKEN)
                .help("Bearer token for the mail relay")
                .env("WAGURI_MAIL_RELAY_TOKEN")
                .hide_env_values(true)
                .requires(ARG_MAIL_RELAY_URL),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of confirmation mail")
                .env("WAGURI_MAIL_FROM")
                .default_value("noreply@waguri.dev"),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM_NAME)
                .long(ARG_MAIL_FROM_NAME)
                .help("Sender display name of confirmation mail")
                .env("WAGURI_MAIL_FROM_NAME")
                .default_value("Waguri"),
        )
        .arg(
            Arg::new(ARG_MAIL_TIMEOUT_SECONDS)
                .long(ARG_MAIL_TIMEOUT_SECONDS)
                .help("Mail relay request timeout")
                .env("WAGURI_MAIL_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
