pub mod auth;
pub mod logging;
pub mod mail;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_PROJECTS_FILE: &str = "projects-file";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("waguri")
        .about("Multi-tenant authentication gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("WAGURI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Database connection string. When set, projects, users and confirmation tokens are stored in PostgreSQL.",
                )
                .env("WAGURI_DSN"),
        )
        .arg(
            Arg::new(ARG_PROJECTS_FILE)
                .long(ARG_PROJECTS_FILE)
                .help("JSON file with the tenant projects, used when no --dsn is given")
                .env("WAGURI_PROJECTS_FILE")
                .required_unless_present(ARG_DSN),
        );

    let command = auth::with_args(command);
    let command = mail::with_args(command);
    logging::with_args(command)
}
