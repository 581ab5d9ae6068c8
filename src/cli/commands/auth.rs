use clap::{Arg, ArgMatches, Command};

pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_MAGIC_LINK_TTL_SECONDS: &str = "magic-link-ttl-seconds";
pub const ARG_OAUTH_STATE_TTL_SECONDS: &str = "oauth-state-ttl-seconds";
pub const ARG_SSO_TTL_SECONDS: &str = "sso-ttl-seconds";
pub const ARG_HEARTBEAT_SECONDS: &str = "heartbeat-seconds";
pub const ARG_ACCESS_CACHE_TTL_SECONDS: &str = "access-cache-ttl-seconds";
pub const ARG_ADMIN_DEFAULT_PATH: &str = "admin-default-path";
pub const ARG_USER_DEFAULT_PATH: &str = "user-default-path";
pub const ARG_DEFAULT_ROLE: &str = "default-role";

/// Token lifetimes and issuing defaults.
#[derive(Debug, Clone)]
pub struct Options {
    pub otp_ttl_seconds: u64,
    pub magic_link_ttl_seconds: u64,
    pub oauth_state_ttl_seconds: u64,
    pub sso_ttl_seconds: u64,
    pub heartbeat_seconds: u64,
    pub access_cache_ttl_seconds: u64,
    pub admin_default_path: String,
    pub user_default_path: String,
    pub default_role: String,
}

impl Options {
    /// Parse lifetime and issuing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is zero or a default path is not absolute.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| -> anyhow::Result<u64> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(value) => Ok(value),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };
        let path = |id: &str| -> anyhow::Result<String> {
            let value = matches.get_one::<String>(id).cloned().unwrap_or_default();
            if !value.starts_with('/') {
                anyhow::bail!("--{id} must be an absolute path, got {value:?}");
            }
            Ok(value)
        };

        Ok(Self {
            otp_ttl_seconds: seconds(ARG_OTP_TTL_SECONDS)?,
            magic_link_ttl_seconds: seconds(ARG_MAGIC_LINK_TTL_SECONDS)?,
            oauth_state_ttl_seconds: seconds(ARG_OAUTH_STATE_TTL_SECONDS)?,
            sso_ttl_seconds: seconds(ARG_SSO_TTL_SECONDS)?,
            heartbeat_seconds: seconds(ARG_HEARTBEAT_SECONDS)?,
            access_cache_ttl_seconds: seconds(ARG_ACCESS_CACHE_TTL_SECONDS)?,
            admin_default_path: path(ARG_ADMIN_DEFAULT_PATH)?,
            user_default_path: path(ARG_USER_DEFAULT_PATH)?,
            default_role: matches
                .get_one::<String>(ARG_DEFAULT_ROLE)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "user".to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_ttl_args(command);
    with_issuing_args(command)
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("One-time code lifetime in seconds")
                .env("PAIRGATE_OTP_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAGIC_LINK_TTL_SECONDS)
                .long(ARG_MAGIC_LINK_TTL_SECONDS)
                .help("Magic link lifetime in seconds")
                .env("PAIRGATE_MAGIC_LINK_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OAUTH_STATE_TTL_SECONDS)
                .long(ARG_OAUTH_STATE_TTL_SECONDS)
                .help("Lifetime of the signed OAuth state parameter in seconds")
                .env("PAIRGATE_OAUTH_STATE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SSO_TTL_SECONDS)
                .long(ARG_SSO_TTL_SECONDS)
                .help("SSO token and auth cookie lifetime in seconds")
                .env("PAIRGATE_SSO_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_HEARTBEAT_SECONDS)
                .long(ARG_HEARTBEAT_SECONDS)
                .help("Interval between keep-alive comments on event streams")
                .env("PAIRGATE_HEARTBEAT_SECONDS")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ACCESS_CACHE_TTL_SECONDS)
                .long(ARG_ACCESS_CACHE_TTL_SECONDS)
                .help("How long route permission rules are cached")
                .env("PAIRGATE_ACCESS_CACHE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_issuing_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_DEFAULT_PATH)
                .long(ARG_ADMIN_DEFAULT_PATH)
                .help("Landing path for admins when the embed names none")
                .env("PAIRGATE_ADMIN_DEFAULT_PATH")
                .default_value("/admin"),
        )
        .arg(
            Arg::new(ARG_USER_DEFAULT_PATH)
                .long(ARG_USER_DEFAULT_PATH)
                .help("Landing path for everyone else when the embed names none")
                .env("PAIRGATE_USER_DEFAULT_PATH")
                .default_value("/dashboard"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_ROLE)
                .long(ARG_DEFAULT_ROLE)
                .help("Role assigned when neither the embed nor the identity has one")
                .env("PAIRGATE_DEFAULT_ROLE")
                .default_value("user"),
        )
}
