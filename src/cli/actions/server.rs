use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

use crate::{
    api,
    cli::{
        commands::{auth, providers},
        telemetry,
    },
    delivery::{self, EmailSender, ResendEmailSender, SmsSender, TwilioSmsSender},
    engine::{Backends, Engine, EngineConfig, Providers},
    oauth::{HttpOAuthClient, OAuthClient, Provider},
    store::{InMemoryStore, PgStore},
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub public_url: String,
    pub server_secret: SecretString,
    pub auth: auth::Options,
    pub providers: providers::Options,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.public_url.clone(), self.server_secret.clone())
            .with_otp_ttl_seconds(self.auth.otp_ttl_seconds)
            .with_magic_link_ttl_seconds(self.auth.magic_link_ttl_seconds)
            .with_oauth_state_ttl_seconds(self.auth.oauth_state_ttl_seconds)
            .with_sso_ttl_seconds(self.auth.sso_ttl_seconds)
            .with_heartbeat_seconds(self.auth.heartbeat_seconds)
            .with_provider_timeout_seconds(self.providers.timeout_seconds)
            .with_access_cache_ttl_seconds(self.auth.access_cache_ttl_seconds)
            .with_admin_default_path(self.auth.admin_default_path.clone())
            .with_user_default_path(self.auth.user_default_path.clone())
            .with_default_role(self.auth.default_role.clone())
    }
}

fn build_providers(options: &providers::Options, timeout: Duration) -> Result<Providers> {
    let http = delivery::http_client(timeout)?;

    let sms = options.twilio.as_ref().map(|twilio| {
        Arc::new(TwilioSmsSender::new(
            twilio.account_sid.clone(),
            twilio.auth_token.clone(),
            twilio.from.clone(),
            http.clone(),
        )) as Arc<dyn SmsSender>
    });

    let email = options.resend.as_ref().map(|resend| {
        Arc::new(ResendEmailSender::new(
            resend.api_key.clone(),
            resend.from.clone(),
            http.clone(),
        )) as Arc<dyn EmailSender>
    });

    let mut oauth: HashMap<Provider, Arc<dyn OAuthClient>> = HashMap::new();
    for (provider, app) in [
        (Provider::Google, &options.google),
        (Provider::GitHub, &options.github),
    ] {
        if let Some(app) = app {
            oauth.insert(
                provider,
                Arc::new(HttpOAuthClient::new(
                    provider,
                    app.client_id.clone(),
                    app.client_secret.clone(),
                    http.clone(),
                )),
            );
        } else {
            info!(%provider, "OAuth provider not configured");
        }
    }

    Ok(Providers { sms, email, oauth })
}

async fn build_backends(dsn: Option<&str>) -> Result<Backends> {
    match dsn {
        Some(dsn) => {
            let store = PgStore::connect(dsn).await?;
            Ok(Backends::postgres(store))
        }
        None => {
            warn!("No --dsn given, using an in-memory store; all state is lost on restart");
            Ok(Backends::in_memory(Arc::new(InMemoryStore::new())))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, a provider cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    Url::parse(&args.public_url)
        .with_context(|| format!("Invalid public URL: {}", args.public_url))?;

    info!(
        port = args.port,
        public_url = %args.public_url,
        persistent = args.dsn.is_some(),
        "Starting pairgate"
    );

    let config = args.engine_config();
    let backends = build_backends(args.dsn.as_deref()).await?;
    let providers = build_providers(&args.providers, config.provider_timeout())?;
    let engine = Arc::new(Engine::new(config, backends, providers));

    let result = api::new(args.port, engine).await;
    telemetry::shutdown_tracer();
    result
}
