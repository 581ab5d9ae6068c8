//! Maps validated CLI arguments to the action to run.

use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::cli::{
    actions::{server::Args, Action},
    commands::{auth, providers, ARG_DSN, ARG_PORT, ARG_PUBLIC_URL, ARG_SERVER_SECRET},
};

/// Minimum length of the HMAC key behind carriers and OAuth state.
const MIN_SERVER_SECRET_LEN: usize = 32;

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
    let public_url = matches
        .get_one::<String>(ARG_PUBLIC_URL)
        .cloned()
        .context("missing required argument: --public-url")?;
    let server_secret = matches
        .get_one::<String>(ARG_SERVER_SECRET)
        .cloned()
        .context("missing required argument: --server-secret")?;
    if server_secret.len() < MIN_SERVER_SECRET_LEN {
        anyhow::bail!("--{ARG_SERVER_SECRET} must be at least {MIN_SERVER_SECRET_LEN} bytes");
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        public_url,
        server_secret: SecretString::from(server_secret),
        auth: auth::Options::parse(matches)?,
        providers: providers::Options::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_server_secret_is_rejected() {
        temp_env::with_vars([("PAIRGATE_SERVER_SECRET", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec!["pairgate", "--server-secret", "short"]);
            let result = handler(&matches);
            assert!(result
                .err()
                .is_some_and(|err| err.to_string().contains("at least 32 bytes")));
        });
    }

    #[test]
    fn empty_dsn_means_in_memory() {
        temp_env::with_vars(
            [
                ("PAIRGATE_DSN", Some("")),
                (
                    "PAIRGATE_SERVER_SECRET",
                    Some("0123456789abcdef0123456789abcdef"),
                ),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["pairgate"]);
                let dsn = match handler(&matches) {
                    Ok(Action::Server(args)) => args.dsn,
                    Err(err) => panic!("unexpected error: {err}"),
                };
                assert!(dsn.is_none());
            },
        );
    }
}
