use anyhow::Context;
use tracing::{info, warn};

use super::{Completion, Evidence};
use crate::{
    embed::AuthMethod,
    engine::Engine,
    error::{EngineError, Result},
    identity::{password::verify_candidate, ExternalProfile},
    session::Transition,
};

#[derive(Debug, Clone)]
pub struct CredentialLogin {
    pub session_token: String,
    pub email: String,
    pub password: String,
}

impl Engine {
    /// Email and password sign-in against a provisioned identity.
    ///
    /// # Errors
    /// `InvalidCredential` for an unknown email, an identity without a
    /// password or a wrong password; otherwise see [`Engine::complete`].
    pub async fn verify_credentials(&self, login: CredentialLogin) -> Result<Completion> {
        let (session, embed) = self
            .open_for(&login.session_token, Transition::Complete, AuthMethod::Password)
            .await?;

        let identity = self.identities.find_by_email(login.email.trim()).await?;
        let stored_hash = identity
            .as_ref()
            .and_then(|identity| identity.password_hash.clone());

        // Unknown emails pay for a hash check too.
        let password = login.password;
        let matched = tokio::task::spawn_blocking(move || {
            verify_candidate(&password, stored_hash.as_deref())
        })
        .await
        .context("password check panicked")?;

        let Some(identity) = identity else {
            info!("Credentials for an unknown email");
            return Err(EngineError::InvalidCredential);
        };
        match matched {
            Ok(true) => {}
            Ok(false) => return Err(EngineError::InvalidCredential),
            Err(err) => {
                warn!(identity_id = %identity.id, error = %err, "Stored password hash is unreadable");
                return Err(EngineError::InvalidCredential);
            }
        }

        self.complete(
            session,
            embed.as_ref(),
            Transition::Complete,
            Evidence {
                approval_fingerprint: None,
                profile: Some(ExternalProfile {
                    external_id: identity.external_id,
                    email: identity.email,
                    name: identity.name,
                }),
            },
        )
        .await
    }
}
