use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_PROVIDER_TIMEOUT_SECONDS: &str = "provider-timeout-seconds";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GITHUB_CLIENT_ID: &str = "github-client-id";
pub const ARG_GITHUB_CLIENT_SECRET: &str = "github-client-secret";
pub const ARG_TWILIO_ACCOUNT_SID: &str = "twilio-account-sid";
pub const ARG_TWILIO_AUTH_TOKEN: &str = "twilio-auth-token";
pub const ARG_TWILIO_FROM: &str = "twilio-from";
pub const ARG_RESEND_API_KEY: &str = "resend-api-key";
pub const ARG_RESEND_FROM: &str = "resend-from";

#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct Twilio {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Resend {
    pub api_key: SecretString,
    pub from: String,
}

/// Outbound integrations. A provider is enabled only when all of its
/// arguments are present.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout_seconds: u64,
    pub google: Option<OAuthApp>,
    pub github: Option<OAuthApp>,
    pub twilio: Option<Twilio>,
    pub resend: Option<Resend>,
}

impl Options {
    /// Parse provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a provider is only partially configured.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let oauth_app = |id_arg: &str, secret_arg: &str| -> anyhow::Result<Option<OAuthApp>> {
            match (get_non_empty(id_arg), get_non_empty(secret_arg)) {
                (Some(client_id), Some(secret)) => Ok(Some(OAuthApp {
                    client_id,
                    client_secret: SecretString::from(secret),
                })),
                (None, None) => Ok(None),
                _ => anyhow::bail!("--{id_arg} and --{secret_arg} must be set together"),
            }
        };

        let twilio = match (
            get_non_empty(ARG_TWILIO_ACCOUNT_SID),
            get_non_empty(ARG_TWILIO_AUTH_TOKEN),
            get_non_empty(ARG_TWILIO_FROM),
        ) {
            (Some(account_sid), Some(auth_token), Some(from)) => Some(Twilio {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "--{ARG_TWILIO_ACCOUNT_SID}, --{ARG_TWILIO_AUTH_TOKEN} and --{ARG_TWILIO_FROM} must be set together"
            ),
        };

        let resend = match (
            get_non_empty(ARG_RESEND_API_KEY),
            get_non_empty(ARG_RESEND_FROM),
        ) {
            (Some(api_key), Some(from)) => Some(Resend {
                api_key: SecretString::from(api_key),
                from,
            }),
            (None, _) => None,
            (Some(_), None) => {
                anyhow::bail!("--{ARG_RESEND_API_KEY} requires --{ARG_RESEND_FROM}")
            }
        };

        Ok(Self {
            timeout_seconds: matches
                .get_one::<u64>(ARG_PROVIDER_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
            google: oauth_app(ARG_GOOGLE_CLIENT_ID, ARG_GOOGLE_CLIENT_SECRET)?,
            github: oauth_app(ARG_GITHUB_CLIENT_ID, ARG_GITHUB_CLIENT_SECRET)?,
            twilio,
            resend,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command.arg(
        Arg::new(ARG_PROVIDER_TIMEOUT_SECONDS)
            .long(ARG_PROVIDER_TIMEOUT_SECONDS)
            .help("Timeout for calls to SMS, email and OAuth providers")
            .env("PAIRGATE_PROVIDER_TIMEOUT_SECONDS")
            .default_value("10")
            .value_parser(clap::value_parser!(u64).range(1..)),
    );
    let command = with_oauth_args(command);
    with_delivery_args(command)
}

fn with_oauth_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("PAIRGATE_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("PAIRGATE_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_ID)
                .long(ARG_GITHUB_CLIENT_ID)
                .help("GitHub OAuth client id")
                .env("PAIRGATE_GITHUB_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_SECRET)
                .long(ARG_GITHUB_CLIENT_SECRET)
                .help("GitHub OAuth client secret")
                .env("PAIRGATE_GITHUB_CLIENT_SECRET")
                .hide_env_values(true),
        )
}

fn with_delivery_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TWILIO_ACCOUNT_SID)
                .long(ARG_TWILIO_ACCOUNT_SID)
                .help("Twilio account SID for SMS codes")
                .env("PAIRGATE_TWILIO_ACCOUNT_SID"),
        )
        .arg(
            Arg::new(ARG_TWILIO_AUTH_TOKEN)
                .long(ARG_TWILIO_AUTH_TOKEN)
                .help("Twilio auth token")
                .env("PAIRGATE_TWILIO_AUTH_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_TWILIO_FROM)
                .long(ARG_TWILIO_FROM)
                .help("Sender phone number for SMS codes")
                .env("PAIRGATE_TWILIO_FROM"),
        )
        .arg(
            Arg::new(ARG_RESEND_API_KEY)
                .long(ARG_RESEND_API_KEY)
                .help("Resend API key for email codes and magic links")
                .env("PAIRGATE_RESEND_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_RESEND_FROM)
                .long(ARG_RESEND_FROM)
                .help("Sender address for emails")
                .env("PAIRGATE_RESEND_FROM"),
        )
}
