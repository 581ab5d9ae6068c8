//! OAuth2 social sign-in.
//!
//! The round trip is bound to an embed through a signed `state` parameter;
//! a session is only created once the provider has vouched for the user.

use std::sync::Arc;

use tracing::info;

use super::{new_session_token, require_method, Completion, Evidence};
use crate::{
    embed::{AuthMethod, EmbedConfig},
    engine::Engine,
    error::{EngineError, Result},
    oauth::{OAuthClient, Provider},
    session::{machine, NewSession, Transition},
    token::{self, jwt, OAuthStateClaims},
};

fn method_for(provider: Provider) -> AuthMethod {
    match provider {
        Provider::Google => AuthMethod::Google,
        Provider::GitHub => AuthMethod::GitHub,
    }
}

impl Engine {
    fn oauth_client(&self, provider: Provider) -> Result<Arc<dyn OAuthClient>> {
        self.oauth
            .get(&provider)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("{provider} sign-in is not configured")))
    }

    async fn social_embed(&self, provider: Provider, template_token: &str) -> Result<EmbedConfig> {
        let embed = self.embeds.resolve_auth(template_token).await?;
        require_method(Some(&embed), method_for(provider))?;
        Ok(embed)
    }

    /// Provider consent URL for an embed, carrying a signed `state`.
    ///
    /// # Errors
    /// `NotFound`/`Inactive`/`UnsupportedComponent` for the embed,
    /// `MethodDisabled`, `Configuration` when the provider is not set up.
    pub async fn authorize_url(
        &self,
        provider: Provider,
        template_token: &str,
        client_origin: Option<String>,
    ) -> Result<String> {
        let embed = self.social_embed(provider, template_token).await?;
        let client = self.oauth_client(provider)?;

        let now = token::now_unix();
        let claims = OAuthStateClaims {
            embed_token: embed.template_token,
            client_origin: client_origin.filter(|origin| !origin.trim().is_empty()),
            iat: now,
            exp: now.saturating_add(
                i64::try_from(self.config.oauth_state_ttl_seconds()).unwrap_or(i64::MAX),
            ),
        };
        let state = jwt::sign(self.config.server_secret(), &claims)
            .map_err(|err| EngineError::Configuration(format!("failed to sign OAuth state: {err}")))?;
        client.authorize_url(&state, &self.config.oauth_callback_url(provider))
    }

    /// Provider callback: exchange the code, provision the user and verify a
    /// fresh session for the embed named in `state`.
    ///
    /// # Errors
    /// `InvalidCredential` for a forged or expired `state` (before any
    /// provider call), `Upstream` for provider failures; otherwise see
    /// [`Engine::complete`].
    pub async fn oauth_callback(&self, provider: Provider, code: &str, state: &str) -> Result<Completion> {
        let claims: OAuthStateClaims = jwt::verify(self.config.server_secret(), state, token::now_unix())?;
        let embed = self.social_embed(provider, &claims.embed_token).await?;
        let client = self.oauth_client(provider)?;

        let redirect_uri = self.config.oauth_callback_url(provider);
        let access_token = client.exchange_code(code, &redirect_uri).await?;
        let profile = client.fetch_profile(&access_token).await?;
        info!(provider = %provider, "Provider profile fetched");

        let session = machine::create(
            self.sessions.as_ref(),
            NewSession {
                token: new_session_token(),
                embed_id: Some(embed.id),
                role: embed.role.clone(),
                client_origin: claims.client_origin,
                ..NewSession::default()
            },
        )
        .await?;
        self.complete(
            session,
            Some(&embed),
            Transition::Complete,
            Evidence {
                approval_fingerprint: None,
                profile: Some(profile.into_external()),
            },
        )
        .await
    }
}
