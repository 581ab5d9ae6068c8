pub mod auth;
pub mod logging;
pub mod providers;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_SERVER_SECRET: &str = "server-secret";

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

    let command = Command::new("pairgate")
        .about("Cross-device session verification and SSO redirect issuer")
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
                .env("PAIRGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Postgres connection string. When omitted, sessions, embeds and identities live in memory and are lost on restart.",
                )
                .env("PAIRGATE_DSN"),
        )
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Externally reachable base URL, used for pairing links, magic links and OAuth callbacks")
                .env("PAIRGATE_PUBLIC_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_SERVER_SECRET)
                .long(ARG_SERVER_SECRET)
                .help("Secret signing OTP carriers, magic links and OAuth state")
                .env("PAIRGATE_SERVER_SECRET")
                .hide_env_values(true)
                .required(true),
        );

    let command = auth::with_args(command);
    let command = providers::with_args(command);
    logging::with_args(command)
}
