//! Credential verifiers.
//!
//! Each verifier establishes trust its own way, then hands off to
//! [`Engine::complete`], which is the only path to `verified`:
//!
//! 1. provision the identity (idempotent, keyed by external id);
//! 2. resolve role and destination, and mint the SSO redirect;
//! 3. apply the guarded transition, writing `verified_at` and the destination
//!    in the same statement.
//!
//! Minting happens before the write, so a signing failure leaves the session
//! untouched instead of half-verified. Subscribers learn about the change from
//! the store's change feed.

mod credentials;
mod magic_link;
mod otp;
mod qr;
mod social;

pub use credentials::CredentialLogin;
pub use magic_link::MagicLinkRequest;
pub use otp::{OtpChallenge, OtpChannel, OtpRequest};
pub use qr::{qr_data_url, Approval, CreateSession, CreatedSession, LoadReport};

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use tracing::info;

use crate::{
    embed::{AuthMethod, EmbedConfig},
    engine::Engine,
    error::{EngineError, Result},
    identity::ExternalProfile,
    session::{machine, Session, SessionPatch, Transition},
};

/// A verified session and where its client should go next.
#[derive(Debug, Clone)]
pub struct Completion {
    pub session: Session,
    /// Destination, wrapped in a signed login redirect when SSO applies.
    pub redirect: String,
}

/// What a verifier learned while establishing trust.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub approval_fingerprint: Option<String>,
    pub profile: Option<ExternalProfile>,
}

/// 32 random bytes, URL-safe base64.
pub(crate) fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Identity the embedding app stored on the session that has not been
/// provisioned yet.
fn carried_profile(session: &Session) -> Option<ExternalProfile> {
    if session.identity_id.is_some() {
        return None;
    }
    let external_id = session
        .external_user_id
        .clone()
        .or_else(|| session.user_email.clone())?;
    Some(ExternalProfile {
        external_id,
        email: session.user_email.clone(),
        name: session.user_name.clone(),
    })
}

/// Legacy sessions (no embed) accept every method.
pub(crate) fn require_method(embed: Option<&EmbedConfig>, method: AuthMethod) -> Result<()> {
    match embed {
        Some(embed) if !embed.methods.allows(method) => Err(EngineError::MethodDisabled(method.as_str())),
        _ => Ok(()),
    }
}

impl Engine {
    /// Embed a session points at; `None` only for legacy sessions.
    pub(crate) async fn session_embed(&self, session: &Session) -> Result<Option<EmbedConfig>> {
        match session.embed_id {
            Some(id) => self.embeds.referenced(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Load a session that a verifier is about to complete, rejecting
    /// sessions the transition cannot start from.
    pub(crate) async fn open_for(
        &self,
        token: &str,
        transition: Transition,
        method: AuthMethod,
    ) -> Result<(Session, Option<EmbedConfig>)> {
        let session = machine::current(self.sessions.as_ref(), token).await?;
        if !transition.sources().contains(&session.state) {
            return Err(EngineError::InvalidState {
                action: transition.action(),
                current: session.state,
            });
        }
        let embed = self.session_embed(&session).await?;
        require_method(embed.as_ref(), method)?;
        Ok((session, embed))
    }

    /// Drive a session to `verified` exactly once.
    ///
    /// # Errors
    /// `InvalidState` if the session already left the transition's source
    /// states (including a concurrent completion), `Configuration` for a
    /// dangling embed or a signing failure, `Store` on I/O failure.
    pub async fn complete(
        &self,
        session: Session,
        embed: Option<&EmbedConfig>,
        transition: Transition,
        evidence: Evidence,
    ) -> Result<Completion> {
        // The verifier's own evidence wins over what the embedding app supplied.
        let profile = evidence.profile.or_else(|| carried_profile(&session));
        let identity = match profile.as_ref() {
            Some(profile) => Some(self.identities.provision(profile).await?),
            None => None,
        };

        // What the row will look like once written; routing and the SSO
        // subject depend on the approval fingerprint and the identity.
        let mut projected = session.clone();
        if projected.approval_fingerprint.is_none() {
            projected.approval_fingerprint = evidence.approval_fingerprint.clone();
        }
        if let Some(identity) = identity.as_ref() {
            projected.identity_id.get_or_insert(identity.id);
            projected
                .external_user_id
                .get_or_insert_with(|| identity.external_id.clone());
        }

        let fallback_role = session
            .role
            .as_deref()
            .or_else(|| identity.as_ref().and_then(|identity| identity.role.as_deref()));
        let role = self.issuer.resolve_role(embed, fallback_role);
        let issued = self.issuer.issue(embed, &projected, &role)?;

        let patch = SessionPatch {
            approval_fingerprint: evidence.approval_fingerprint,
            external_user_id: identity.as_ref().map(|identity| identity.external_id.clone()),
            user_email: identity.as_ref().and_then(|identity| identity.email.clone()),
            user_name: identity.as_ref().and_then(|identity| identity.name.clone()),
            identity_id: identity.as_ref().map(|identity| identity.id),
            role: Some(role.clone()),
            success_url: Some(issued.destination),
            ..SessionPatch::default()
        };
        let verified = machine::apply(self.sessions.as_ref(), &session.token, transition, &patch).await?;

        info!(
            action = transition.action(),
            embed_id = ?verified.embed_id,
            identity_id = ?verified.identity_id,
            role = %role,
            "Session verified"
        );
        Ok(Completion {
            session: verified,
            redirect: issued.redirect,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use secrecy::SecretString;
    use uuid::Uuid;

    use crate::{
        embed::{ActivePath, AuthMethods, ComponentKind, Destinations, EmbedConfig, RoutingRule},
        engine::{Backends, Engine, EngineConfig, Providers},
        store::InMemoryStore,
    };

    pub(crate) const SERVER_SECRET: &str = "server-secret";

    pub(crate) fn embed(secret: Option<&str>) -> EmbedConfig {
        EmbedConfig {
            id: Uuid::new_v4(),
            template_token: format!("tpl-{}", Uuid::new_v4()),
            component: ComponentKind::QrAuth,
            methods: AuthMethods {
                qr: true,
                phone_otp: true,
                email_otp: true,
                password: true,
                google: true,
                github: true,
            },
            destinations: Destinations {
                success_url_a: Some("/dashboard".to_string()),
                success_url_b: Some("/welcome".to_string()),
                active_path: ActivePath::A,
                routing_rule: RoutingRule::None,
            },
            signing_secret: secret.map(|secret| SecretString::from(secret.to_string())),
            role: None,
            active: true,
        }
    }

    pub(crate) fn engine_with(store: Arc<InMemoryStore>, providers: Providers) -> Engine {
        let config = EngineConfig::new(
            "https://pair.example.com".to_string(),
            SecretString::from(SERVER_SECRET.to_string()),
        );
        Engine::new(config, Backends::in_memory(store), providers)
    }

    pub(crate) fn engine(store: Arc<InMemoryStore>) -> Engine {
        engine_with(store, Providers::default())
    }
}
