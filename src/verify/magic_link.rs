use tracing::info;

use super::{Completion, Evidence};
use crate::{
    delivery::EmailMessage,
    embed::AuthMethod,
    engine::Engine,
    error::{EngineError, Result},
    identity::ExternalProfile,
    session::Transition,
    token::CarrierPurpose,
};

#[derive(Debug, Clone)]
pub struct MagicLinkRequest {
    pub session_token: String,
    pub email: String,
}

impl Engine {
    /// Email a single-use sign-in link for a session. The carrier travels only
    /// inside the link.
    ///
    /// # Errors
    /// `NotFound`, `InvalidState` for a verified session, `MethodDisabled`
    /// when email sign-in is off, `Configuration` if the carrier cannot be signed.
    pub async fn send_magic_link(&self, request: MagicLinkRequest) -> Result<()> {
        let email = request.email.trim();
        if !email.contains('@') {
            return Err(EngineError::InvalidCredential);
        }
        let (session, _) = self
            .open_for(&request.session_token, Transition::Complete, AuthMethod::EmailOtp)
            .await?;
        let (carrier, _) = self.sign_carrier(
            &session.token,
            email,
            None,
            CarrierPurpose::MagicLink,
            self.config.magic_link_ttl_seconds(),
        )?;

        let link = self.config.magic_link_url(&carrier);
        let minutes = self.config.magic_link_ttl_seconds() / 60;
        self.deliver_email(&EmailMessage {
            to: email.to_string(),
            subject: "Your sign-in link".to_string(),
            text: format!("Open this link to sign in: {link}\n\nIt expires in {minutes} minutes."),
        })
        .await;
        info!("Magic link issued");
        Ok(())
    }

    /// Redeem a magic-link carrier.
    ///
    /// # Errors
    /// `InvalidCredential` for a forged, expired or foreign carrier; otherwise
    /// see [`Engine::complete`].
    pub async fn verify_magic_link(&self, carrier: &str) -> Result<Completion> {
        let claims = self.open_carrier(carrier, CarrierPurpose::MagicLink)?;
        let (session, embed) = self
            .open_for(&claims.session_token, Transition::Complete, AuthMethod::EmailOtp)
            .await?;
        self.complete(
            session,
            embed.as_ref(),
            Transition::Complete,
            Evidence {
                approval_fingerprint: None,
                profile: Some(ExternalProfile {
                    external_id: claims.identifier.clone(),
                    email: Some(claims.identifier),
                    name: None,
                }),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{embed, engine, engine_with};
    use super::super::CreateSession;
    use super::*;
    use crate::{
        delivery::EmailSender,
        engine::Providers,
        session::SessionState,
        store::InMemoryStore,
    };
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use url::Url;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl EmailSender for Outbox {
        async fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(message.clone());
            Ok(())
        }
    }

    fn link_token(text: &str) -> Result<String> {
        let link = text
            .split_whitespace()
            .find(|word| word.starts_with("https://"))
            .context("no link in message")?;
        let url = Url::parse(link)?;
        url.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
            .context("no token in link")
    }

    #[tokio::test]
    async fn emailed_link_verifies_the_session() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let outbox = Arc::new(Outbox::default());
        let engine = engine_with(
            store,
            Providers {
                email: Some(outbox.clone()),
                ..Providers::default()
            },
        );
        let created = engine
            .create_session(CreateSession {
                template_token: Some(config.template_token.clone()),
                fingerprint: None,
                client_origin: Some("https://shop.example.com".to_string()),
                user: None,
            })
            .await?;

        engine
            .send_magic_link(MagicLinkRequest {
                session_token: created.session.token.clone(),
                email: "ada@example.com".to_string(),
            })
            .await?;
        let message = outbox
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .first()
            .cloned()
            .context("nothing sent")?;
        assert_eq!(message.to, "ada@example.com");
        assert!(message.text.contains("https://pair.example.com/v1/magic-link/verify?token="));

        let completion = engine.verify_magic_link(&link_token(&message.text)?).await?;
        assert_eq!(completion.session.state, SessionState::Verified);
        assert_eq!(completion.session.user_email.as_deref(), Some("ada@example.com"));
        assert_eq!(completion.redirect, "https://shop.example.com/dashboard");
        Ok(())
    }

    #[tokio::test]
    async fn otp_carrier_cannot_be_redeemed_as_a_link() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let engine = engine(store);
        let created = engine
            .create_session(CreateSession {
                template_token: Some(config.template_token.clone()),
                ..CreateSession::default()
            })
            .await?;
        let (carrier, _) = engine.sign_carrier(
            &created.session.token,
            "ada@example.com",
            Some("digest".to_string()),
            CarrierPurpose::Otp,
            600,
        )?;
        assert!(matches!(
            engine.verify_magic_link(&carrier).await,
            Err(EngineError::InvalidCredential)
        ));
        assert!(matches!(
            engine.verify_magic_link("not-a-token").await,
            Err(EngineError::InvalidCredential)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn disabled_email_sign_in_is_rejected() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let mut config = embed(None);
        config.methods.email_otp = false;
        store.insert_embed(config.clone());
        let engine = engine(store);
        let created = engine
            .create_session(CreateSession {
                template_token: Some(config.template_token.clone()),
                ..CreateSession::default()
            })
            .await?;
        let result = engine
            .send_magic_link(MagicLinkRequest {
                session_token: created.session.token,
                email: "ada@example.com".to_string(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::MethodDisabled("email_otp"))));
        Ok(())
    }
}
