//! Destination resolution and SSO token issuance for verified sessions.
//!
//! The destination stored on the session is always the plain, resolved URL.
//! Wrapping it in a signed `/api/auth/login` redirect happens on the way out,
//! every time a client is told where to go, so a fresh token is minted for
//! every response and notification.

pub mod routing;

use rand::Rng;
use secrecy::ExposeSecret;
use url::{form_urlencoded, Url};

use crate::{
    embed::{EmbedConfig, EmbedRegistry},
    error::{EngineError, Result},
    session::Session,
    token::{self, jwt, SsoClaims},
};

pub const LOGIN_PATH: &str = "/api/auth/login";

const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct IssuerSettings {
    pub admin_default_path: String,
    pub user_default_path: String,
    pub default_role: String,
    pub sso_ttl_seconds: u64,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            admin_default_path: "/admin".to_string(),
            user_default_path: "/dashboard".to_string(),
            default_role: "user".to_string(),
            sso_ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// Outcome of issuing for a verified session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// Persisted on the session row.
    pub destination: String,
    /// Returned to the client; equals `destination` when no SSO token applies.
    pub redirect: String,
}

pub struct Issuer {
    embeds: EmbedRegistry,
    settings: IssuerSettings,
}

impl Issuer {
    #[must_use]
    pub fn new(embeds: EmbedRegistry, settings: IssuerSettings) -> Self {
        Self { embeds, settings }
    }

    /// Embed-bound role first, then `fallback` (the load-time role, else the
    /// identity's own role), then the configured default.
    #[must_use]
    pub fn resolve_role(&self, embed: Option<&EmbedConfig>, fallback: Option<&str>) -> String {
        embed
            .and_then(|embed| embed.role.as_deref())
            .or(fallback)
            .filter(|role| !role.is_empty())
            .unwrap_or(self.settings.default_role.as_str())
            .to_string()
    }

    fn role_default(&self, role: &str) -> &str {
        if role == ADMIN_ROLE {
            &self.settings.admin_default_path
        } else {
            &self.settings.user_default_path
        }
    }

    /// Absolute (when possible) destination for a session about to be verified.
    #[must_use]
    pub fn destination(
        &self,
        embed: Option<&EmbedConfig>,
        session: &Session,
        role: &str,
        coin: bool,
    ) -> String {
        let role_default = self.role_default(role);
        let resolved = embed.map_or_else(
            || role_default.to_string(),
            |embed| {
                let path = routing::select_path(
                    &embed.destinations,
                    session.origin_fingerprint.as_deref(),
                    session.approval_fingerprint.as_deref(),
                    coin,
                );
                routing::resolve(&embed.destinations, path, role_default)
            },
        );
        routing::absolutize(&resolved, session.client_origin.as_deref())
    }

    /// Wrap `destination` in a signed login redirect when the embed has a
    /// secret and there is a subject to issue for.
    ///
    /// # Errors
    /// `Configuration` if the token cannot be signed. Never falls back to an
    /// unsigned redirect.
    pub fn wrap(
        &self,
        embed: Option<&EmbedConfig>,
        destination: &str,
        subject: Option<&str>,
        role: &str,
    ) -> Result<String> {
        let (Some(embed), Some(subject)) = (embed, subject) else {
            return Ok(destination.to_string());
        };
        let Some(secret) = embed.signing_secret.as_ref() else {
            return Ok(destination.to_string());
        };

        let now = token::now_unix();
        let claims = SsoClaims {
            user_id: subject.to_string(),
            embed_id: embed.id.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now.saturating_add(i64::try_from(self.settings.sso_ttl_seconds).unwrap_or(i64::MAX)),
        };
        let sso = jwt::sign(secret.expose_secret().as_bytes(), &claims)
            .map_err(|err| EngineError::Configuration(format!("failed to sign SSO token: {err}")))?;
        Ok(login_url(destination, &sso))
    }

    /// Resolve, then wrap, for a session being verified right now.
    ///
    /// # Errors
    /// See [`Self::wrap`].
    pub fn issue(&self, embed: Option<&EmbedConfig>, session: &Session, role: &str) -> Result<Issued> {
        let coin = rand::thread_rng().gen_bool(0.5);
        let destination = self.destination(embed, session, role, coin);
        let redirect = self.wrap(embed, &destination, session.subject().as_deref(), role)?;
        Ok(Issued {
            destination,
            redirect,
        })
    }

    /// Client-facing redirect for an already verified session, re-minted from
    /// the persisted destination and the role persisted at verification.
    ///
    /// # Errors
    /// `Configuration` for a dangling embed reference or a signing failure.
    pub async fn redirect_for(&self, session: &Session) -> Result<Option<String>> {
        let Some(destination) = session.success_url.as_deref() else {
            return Ok(None);
        };
        let embed = match session.embed_id {
            Some(id) => Some(self.embeds.referenced(id).await?),
            None => None,
        };
        let role = match session.role.as_deref().filter(|role| !role.is_empty()) {
            Some(role) => role.to_string(),
            None => self.resolve_role(embed.as_ref(), None),
        };
        self.wrap(embed.as_ref(), destination, session.subject().as_deref(), &role)
            .map(Some)
    }

    /// Verify an SSO token against the secret of the embed it names.
    ///
    /// The unverified `embedId` claim only selects which secret to use.
    ///
    /// # Errors
    /// `InvalidCredential` for malformed, forged or expired tokens and for
    /// embeds without a secret.
    pub async fn verify_sso(&self, sso: &str) -> Result<(SsoClaims, EmbedConfig)> {
        let unverified: SsoClaims = jwt::peek(sso)?;
        let embed_id = unverified
            .embed_id
            .parse()
            .map_err(|_| EngineError::InvalidCredential)?;
        let embed = match self.embeds.referenced(embed_id).await {
            Ok(embed) => embed,
            Err(EngineError::Configuration(_)) => return Err(EngineError::InvalidCredential),
            Err(err) => return Err(err),
        };
        let secret = embed
            .signing_secret
            .as_ref()
            .ok_or(EngineError::InvalidCredential)?;
        let claims = jwt::verify(secret.expose_secret().as_bytes(), sso, token::now_unix())?;
        Ok((claims, embed))
    }
}

/// `{appOrigin}/api/auth/login?token=..&redirectUrl=..`, where the app origin is
/// the destination's own. Relative destinations get a relative login URL.
fn login_url(destination: &str, sso: &str) -> String {
    if let Ok(parsed) = Url::parse(destination) {
        if let Ok(mut login) = Url::parse(&parsed.origin().ascii_serialization())
            .and_then(|origin| origin.join(LOGIN_PATH))
        {
            login
                .query_pairs_mut()
                .append_pair("token", sso)
                .append_pair("redirectUrl", destination);
            return login.to_string();
        }
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("token", sso)
        .append_pair("redirectUrl", destination)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embed::{ActivePath, AuthMethods, ComponentKind, Destinations, RoutingRule},
        session::SessionState,
        store::InMemoryStore,
    };
    use anyhow::{Context, Result};
    use chrono::Utc;
    use secrecy::SecretString;
    use std::sync::Arc;
    use uuid::Uuid;

    fn embed(secret: Option<&str>, role: Option<&str>) -> EmbedConfig {
        EmbedConfig {
            id: Uuid::new_v4(),
            template_token: "tpl".to_string(),
            component: ComponentKind::QrAuth,
            methods: AuthMethods::default(),
            destinations: Destinations {
                success_url_a: Some("/dashboard".to_string()),
                success_url_b: Some("/welcome".to_string()),
                active_path: ActivePath::A,
                routing_rule: RoutingRule::None,
            },
            signing_secret: secret.map(|s| SecretString::from(s.to_string())),
            role: role.map(str::to_string),
            active: true,
        }
    }

    fn session(embed_id: Option<Uuid>) -> Session {
        Session {
            token: "tok".to_string(),
            state: SessionState::Scanned,
            embed_id,
            origin_fingerprint: Some("fp1".to_string()),
            approval_fingerprint: Some("fp2".to_string()),
            external_user_id: Some("github-42".to_string()),
            user_email: None,
            user_name: None,
            identity_id: None,
            role: None,
            client_origin: Some("https://shop.example.com".to_string()),
            success_url: None,
            created_at: Utc::now(),
            loaded_at: None,
            scanned_at: None,
            verified_at: None,
        }
    }

    fn issuer(store: Arc<InMemoryStore>) -> Issuer {
        Issuer::new(EmbedRegistry::new(store), IssuerSettings::default())
    }

    #[test]
    fn without_secret_redirect_is_destination() -> Result<()> {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let embed = embed(None, None);
        let issued = issuer.issue(Some(&embed), &session(Some(embed.id)), "user")?;
        assert_eq!(issued.destination, "https://shop.example.com/dashboard");
        assert_eq!(issued.redirect, issued.destination);
        Ok(())
    }

    #[test]
    fn with_secret_minted_token_verifies() -> Result<()> {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let embed = embed(Some("embed-secret"), Some("editor"));
        let role = issuer.resolve_role(Some(&embed), None);
        let issued = issuer.issue(Some(&embed), &session(Some(embed.id)), &role)?;

        let url = Url::parse(&issued.redirect)?;
        assert_eq!(url.path(), LOGIN_PATH);
        assert_eq!(url.origin().ascii_serialization(), "https://shop.example.com");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs.get("redirectUrl").map(String::as_str),
            Some("https://shop.example.com/dashboard")
        );
        let sso = pairs.get("token").context("missing token")?;
        let claims: SsoClaims = jwt::verify(b"embed-secret", sso, token::now_unix())?;
        assert_eq!(claims.user_id, "github-42");
        assert_eq!(claims.embed_id, embed.id.to_string());
        assert_eq!(claims.role, "editor");
        assert!(jwt::verify::<SsoClaims>(b"other", sso, token::now_unix()).is_err());
        Ok(())
    }

    #[test]
    fn no_subject_means_no_token() -> Result<()> {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let embed = embed(Some("embed-secret"), None);
        let mut anonymous = session(Some(embed.id));
        anonymous.external_user_id = None;
        let issued = issuer.issue(Some(&embed), &anonymous, "user")?;
        assert_eq!(issued.redirect, issued.destination);
        Ok(())
    }

    #[test]
    fn legacy_session_uses_role_default() {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let mut legacy = session(None);
        legacy.client_origin = None;
        assert_eq!(issuer.destination(None, &legacy, "admin", true), "/admin");
        assert_eq!(issuer.destination(None, &legacy, "user", true), "/dashboard");
    }

    #[test]
    fn role_precedence() {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let bound = embed(None, Some("admin"));
        let unbound = embed(None, None);
        assert_eq!(issuer.resolve_role(Some(&bound), Some("user")), "admin");
        assert_eq!(issuer.resolve_role(Some(&unbound), Some("editor")), "editor");
        assert_eq!(issuer.resolve_role(None, None), "user");
    }

    #[test]
    fn relative_login_url_encodes_destination() {
        let url = login_url("/dashboard?tab=1", "a.b.c");
        assert_eq!(
            url,
            "/api/auth/login?token=a.b.c&redirectUrl=%2Fdashboard%3Ftab%3D1"
        );
    }

    #[tokio::test]
    async fn redirect_for_reuses_the_persisted_role() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let embed = embed(Some("embed-secret"), Some("editor"));
        store.insert_embed(embed.clone());
        let issuer = issuer(store);
        let mut verified = session(Some(embed.id));
        verified.state = SessionState::Verified;
        verified.success_url = Some("https://shop.example.com/dashboard".to_string());
        verified.role = Some("auditor".to_string());

        let redirect = issuer.redirect_for(&verified).await?.context("no redirect")?;
        let url = Url::parse(&redirect)?;
        let sso = url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .context("missing token")?;
        let claims: SsoClaims = jwt::verify(b"embed-secret", &sso, token::now_unix())?;
        assert_eq!(claims.role, "auditor");
        Ok(())
    }

    #[tokio::test]
    async fn redirect_for_dangling_embed_is_configuration_error() {
        let issuer = issuer(Arc::new(InMemoryStore::new()));
        let mut verified = session(Some(Uuid::new_v4()));
        verified.success_url = Some("/dashboard".to_string());
        assert!(matches!(
            issuer.redirect_for(&verified).await,
            Err(EngineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn verify_sso_uses_the_named_embed_secret() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let embed = embed(Some("embed-secret"), None);
        store.insert_embed(embed.clone());
        let issuer = issuer(store);
        let now = token::now_unix();
        let claims = SsoClaims {
            user_id: "u".to_string(),
            embed_id: embed.id.to_string(),
            role: "user".to_string(),
            iat: now,
            exp: now + 60,
        };
        let good = jwt::sign(b"embed-secret", &claims)?;
        let (verified, _) = issuer.verify_sso(&good).await?;
        assert_eq!(verified, claims);

        let forged = jwt::sign(b"guess", &claims)?;
        assert!(matches!(
            issuer.verify_sso(&forged).await,
            Err(EngineError::InvalidCredential)
        ));
        Ok(())
    }
}
