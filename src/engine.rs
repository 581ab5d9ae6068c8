//! Engine configuration and the bundle of components every entry point shares.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::{
    access::{RoutePermissionCache, RoutePermissionSource, SystemClock},
    delivery::{EmailSender, SmsSender},
    embed::{EmbedRegistry, EmbedStore},
    identity::IdentityStore,
    issuer::{Issuer, IssuerSettings},
    oauth::{OAuthClient, Provider},
    session::{Notifier, SessionStore},
    store::{InMemoryStore, PgStore},
};

const DEFAULT_OTP_TTL_SECONDS: u64 = 10 * 60;
const DEFAULT_MAGIC_LINK_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_OAUTH_STATE_TTL_SECONDS: u64 = 10 * 60;
const DEFAULT_SSO_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_HEARTBEAT_SECONDS: u64 = 15;
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_ACCESS_CACHE_TTL_SECONDS: u64 = 60;
const DEFAULT_ADMIN_PATH: &str = "/admin";
const DEFAULT_USER_PATH: &str = "/dashboard";
const DEFAULT_ROLE: &str = "user";

#[derive(Clone)]
pub struct EngineConfig {
    public_url: String,
    server_secret: SecretString,
    otp_ttl_seconds: u64,
    magic_link_ttl_seconds: u64,
    oauth_state_ttl_seconds: u64,
    sso_ttl_seconds: u64,
    heartbeat_seconds: u64,
    provider_timeout_seconds: u64,
    access_cache_ttl_seconds: u64,
    admin_default_path: String,
    user_default_path: String,
    default_role: String,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("public_url", &self.public_url)
            .field("server_secret", &"[REDACTED]")
            .field("otp_ttl_seconds", &self.otp_ttl_seconds)
            .field("magic_link_ttl_seconds", &self.magic_link_ttl_seconds)
            .field("oauth_state_ttl_seconds", &self.oauth_state_ttl_seconds)
            .field("sso_ttl_seconds", &self.sso_ttl_seconds)
            .field("heartbeat_seconds", &self.heartbeat_seconds)
            .field("provider_timeout_seconds", &self.provider_timeout_seconds)
            .field("access_cache_ttl_seconds", &self.access_cache_ttl_seconds)
            .field("admin_default_path", &self.admin_default_path)
            .field("user_default_path", &self.user_default_path)
            .field("default_role", &self.default_role)
            .finish()
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new(public_url: String, server_secret: SecretString) -> Self {
        Self {
            public_url: public_url.trim_end_matches('/').to_string(),
            server_secret,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            magic_link_ttl_seconds: DEFAULT_MAGIC_LINK_TTL_SECONDS,
            oauth_state_ttl_seconds: DEFAULT_OAUTH_STATE_TTL_SECONDS,
            sso_ttl_seconds: DEFAULT_SSO_TTL_SECONDS,
            heartbeat_seconds: DEFAULT_HEARTBEAT_SECONDS,
            provider_timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            access_cache_ttl_seconds: DEFAULT_ACCESS_CACHE_TTL_SECONDS,
            admin_default_path: DEFAULT_ADMIN_PATH.to_string(),
            user_default_path: DEFAULT_USER_PATH.to_string(),
            default_role: DEFAULT_ROLE.to_string(),
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: u64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_magic_link_ttl_seconds(mut self, seconds: u64) -> Self {
        self.magic_link_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_oauth_state_ttl_seconds(mut self, seconds: u64) -> Self {
        self.oauth_state_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_sso_ttl_seconds(mut self, seconds: u64) -> Self {
        self.sso_ttl_seconds = seconds;
        self
    }

    /// Keepalive period for notification streams; clamped to 10-20 seconds.
    #[must_use]
    pub fn with_heartbeat_seconds(mut self, seconds: u64) -> Self {
        self.heartbeat_seconds = seconds.clamp(10, 20);
        self
    }

    #[must_use]
    pub fn with_provider_timeout_seconds(mut self, seconds: u64) -> Self {
        self.provider_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_access_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_cache_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_admin_default_path(mut self, path: String) -> Self {
        self.admin_default_path = path;
        self
    }

    #[must_use]
    pub fn with_user_default_path(mut self, path: String) -> Self {
        self.user_default_path = path;
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: String) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub(crate) fn server_secret(&self) -> &[u8] {
        self.server_secret.expose_secret().as_bytes()
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> u64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn magic_link_ttl_seconds(&self) -> u64 {
        self.magic_link_ttl_seconds
    }

    #[must_use]
    pub fn oauth_state_ttl_seconds(&self) -> u64 {
        self.oauth_state_ttl_seconds
    }

    #[must_use]
    pub fn sso_ttl_seconds(&self) -> u64 {
        self.sso_ttl_seconds
    }

    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    #[must_use]
    pub fn access_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.access_cache_ttl_seconds)
    }

    pub(crate) fn cookie_secure(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Where a scanned QR code sends the second device.
    #[must_use]
    pub fn pairing_url(&self, session_token: &str) -> String {
        format!("{}/v1/sessions/{session_token}/scan", self.public_url)
    }

    #[must_use]
    pub fn magic_link_url(&self, carrier: &str) -> String {
        format!("{}/v1/magic-link/verify?token={carrier}", self.public_url)
    }

    #[must_use]
    pub fn oauth_callback_url(&self, provider: Provider) -> String {
        format!("{}/v1/oauth/{}/callback", self.public_url, provider.as_str())
    }

    fn issuer_settings(&self) -> IssuerSettings {
        IssuerSettings {
            admin_default_path: self.admin_default_path.clone(),
            user_default_path: self.user_default_path.clone(),
            default_role: self.default_role.clone(),
            sso_ttl_seconds: self.sso_ttl_seconds,
        }
    }
}

/// Storage the engine reads and writes through.
#[derive(Clone)]
pub struct Backends {
    pub embeds: Arc<dyn EmbedStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub permissions: Arc<dyn RoutePermissionSource>,
}

impl Backends {
    /// Every concern backed by one in-memory store.
    #[must_use]
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            embeds: store.clone(),
            sessions: store.clone(),
            identities: store.clone(),
            permissions: store,
        }
    }

    #[must_use]
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            embeds: store.clone(),
            sessions: store.clone(),
            identities: store.clone(),
            permissions: store,
        }
    }
}

/// Outbound integrations. Anything left unset falls back to logging.
#[derive(Clone, Default)]
pub struct Providers {
    pub sms: Option<Arc<dyn SmsSender>>,
    pub email: Option<Arc<dyn EmailSender>>,
    pub oauth: HashMap<Provider, Arc<dyn OAuthClient>>,
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) embeds: EmbedRegistry,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) identities: Arc<dyn IdentityStore>,
    pub(crate) issuer: Arc<Issuer>,
    pub(crate) notifier: Notifier,
    /// `None` means demo mode: messages are logged, not delivered.
    pub(crate) sms: Option<Arc<dyn SmsSender>>,
    pub(crate) email: Option<Arc<dyn EmailSender>>,
    pub(crate) oauth: HashMap<Provider, Arc<dyn OAuthClient>>,
    pub(crate) access: RoutePermissionCache,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, backends: Backends, providers: Providers) -> Self {
        let embeds = EmbedRegistry::new(backends.embeds);
        let issuer = Arc::new(Issuer::new(embeds.clone(), config.issuer_settings()));
        let notifier = Notifier::new(backends.sessions.clone(), issuer.clone(), config.heartbeat());
        let access = RoutePermissionCache::new(
            backends.permissions,
            Arc::new(SystemClock),
            config.access_cache_ttl(),
        );

        if providers.sms.is_none() {
            warn!("No SMS provider configured, codes will only be logged");
        }
        if providers.email.is_none() {
            warn!("No email provider configured, codes and links will only be logged");
        }

        Self {
            config,
            embeds,
            sessions: backends.sessions,
            identities: backends.identities,
            issuer,
            notifier,
            sms: providers.sms,
            email: providers.email,
            oauth: providers.oauth,
            access,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn embeds(&self) -> &EmbedRegistry {
        &self.embeds
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    #[must_use]
    pub fn access(&self) -> &RoutePermissionCache {
        &self.access
    }

    /// # Errors
    /// Returns an error when the session store cannot be reached.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.sessions.ping().await
    }
}
