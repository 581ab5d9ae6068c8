//! Numeric one-time codes over SMS or email.
//!
//! Nothing is stored server-side: the client holds a signed carrier with a
//! keyed digest of the code and presents it back together with what the user
//! typed.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, Rng};
use sha2::Sha256;
use tracing::{error, info, warn};

use super::{Completion, Evidence};
use crate::{
    delivery::{EmailMessage, EmailSender, LogSender, SmsSender},
    embed::AuthMethod,
    engine::Engine,
    error::{EngineError, Result},
    identity::ExternalProfile,
    session::Transition,
    token::{self, jwt, CarrierClaims, CarrierPurpose},
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpChannel {
    Phone,
    Email,
}

impl OtpChannel {
    fn method(self) -> AuthMethod {
        match self {
            Self::Phone => AuthMethod::PhoneOtp,
            Self::Email => AuthMethod::EmailOtp,
        }
    }

    /// Channel a carrier identifier was issued for.
    fn of(identifier: &str) -> Self {
        if identifier.contains('@') {
            Self::Email
        } else {
            Self::Phone
        }
    }
}

#[derive(Debug, Clone)]
pub struct OtpRequest {
    pub session_token: String,
    pub channel: OtpChannel,
    /// Phone number or email address.
    pub identifier: String,
}

#[derive(Debug, Clone)]
pub struct OtpChallenge {
    /// Signed carrier to present back with the code.
    pub carrier: String,
    pub expires_at: i64,
}

fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

fn keyed(secret: &[u8], session_token: &str, identifier: &str, code: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|err| EngineError::Configuration(format!("invalid server secret: {err}")))?;
    mac.update(session_token.as_bytes());
    mac.update(b":");
    mac.update(identifier.as_bytes());
    mac.update(b":");
    mac.update(code.as_bytes());
    Ok(mac)
}

pub(super) fn otp_digest(secret: &[u8], session_token: &str, identifier: &str, code: &str) -> Result<String> {
    let mac = keyed(secret, session_token, identifier, code)?;
    Ok(Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes()))
}

fn digest_matches(secret: &[u8], carrier: &CarrierClaims, code: &str) -> Result<bool> {
    let Some(expected) = carrier.otp.as_deref() else {
        return Ok(false);
    };
    let Ok(expected) = Base64UrlUnpadded::decode_vec(expected) else {
        return Ok(false);
    };
    let mac = keyed(secret, &carrier.session_token, &carrier.identifier, code.trim())?;
    Ok(mac.verify_slice(&expected).is_ok())
}

fn ttl(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

impl Engine {
    /// Sign a carrier for `session_token` with the server secret.
    pub(super) fn sign_carrier(
        &self,
        session_token: &str,
        identifier: &str,
        otp: Option<String>,
        purpose: CarrierPurpose,
        ttl_seconds: u64,
    ) -> Result<(String, i64)> {
        let now = token::now_unix();
        let exp = now.saturating_add(ttl(ttl_seconds));
        let claims = CarrierClaims {
            session_token: session_token.to_string(),
            identifier: identifier.to_string(),
            otp,
            purpose,
            iat: now,
            exp,
        };
        let carrier = jwt::sign(self.config.server_secret(), &claims)
            .map_err(|err| EngineError::Configuration(format!("failed to sign carrier: {err}")))?;
        Ok((carrier, exp))
    }

    pub(super) fn open_carrier(&self, carrier: &str, purpose: CarrierPurpose) -> Result<CarrierClaims> {
        let claims: CarrierClaims = jwt::verify(self.config.server_secret(), carrier, token::now_unix())?;
        Ok(claims.expect_purpose(purpose)?)
    }

    /// Send an SMS, falling back to the log when no provider is configured.
    /// Failures are logged and swallowed.
    pub(super) async fn deliver_sms(&self, to: &str, body: &str) {
        let result = match self.sms.as_ref() {
            Some(sender) => sender.send_sms(to, body).await,
            None => {
                error!(
                    error = %EngineError::Configuration("no SMS provider configured".to_string()),
                    "Delivering through the log instead"
                );
                LogSender.send_sms(to, body).await
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "SMS delivery failed");
        }
    }

    pub(super) async fn deliver_email(&self, message: &EmailMessage) {
        let result = match self.email.as_ref() {
            Some(sender) => sender.send_email(message).await,
            None => {
                error!(
                    error = %EngineError::Configuration("no email provider configured".to_string()),
                    "Delivering through the log instead"
                );
                LogSender.send_email(message).await
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "Email delivery failed");
        }
    }

    /// Generate a code, send it, and return the carrier the client must
    /// present with the code. Delivery failures never block the flow.
    ///
    /// # Errors
    /// `NotFound`, `InvalidState` for a verified session, `MethodDisabled`,
    /// `Configuration` if the carrier cannot be signed.
    pub async fn send_otp(&self, request: OtpRequest) -> Result<OtpChallenge> {
        let identifier = request.identifier.trim();
        if identifier.is_empty() {
            return Err(EngineError::InvalidCredential);
        }
        let (session, _) = self
            .open_for(&request.session_token, Transition::Complete, request.channel.method())
            .await?;

        let code = generate_code();
        let digest = otp_digest(self.config.server_secret(), &session.token, identifier, &code)?;
        let (carrier, expires_at) = self.sign_carrier(
            &session.token,
            identifier,
            Some(digest),
            CarrierPurpose::Otp,
            self.config.otp_ttl_seconds(),
        )?;

        let minutes = self.config.otp_ttl_seconds() / 60;
        let body = format!("Your verification code is {code}. It expires in {minutes} minutes.");
        match request.channel {
            OtpChannel::Phone => self.deliver_sms(identifier, &body).await,
            OtpChannel::Email => {
                self.deliver_email(&EmailMessage {
                    to: identifier.to_string(),
                    subject: "Your verification code".to_string(),
                    text: body,
                })
                .await;
            }
        }
        info!(channel = ?request.channel, "OTP issued");

        Ok(OtpChallenge { carrier, expires_at })
    }

    /// Check a submitted code against its carrier and verify the session.
    ///
    /// # Errors
    /// `InvalidCredential` for a forged, expired or mismatched carrier/code
    /// (the session is left untouched); otherwise see [`Engine::complete`].
    pub async fn verify_otp(&self, carrier: &str, code: &str) -> Result<Completion> {
        let claims = self.open_carrier(carrier, CarrierPurpose::Otp)?;
        if !digest_matches(self.config.server_secret(), &claims, code)? {
            info!("OTP mismatch");
            return Err(EngineError::InvalidCredential);
        }

        let channel = OtpChannel::of(&claims.identifier);
        let (session, embed) = self
            .open_for(&claims.session_token, Transition::Complete, channel.method())
            .await?;
        let profile = ExternalProfile {
            external_id: claims.identifier.clone(),
            email: (channel == OtpChannel::Email).then(|| claims.identifier.clone()),
            name: None,
        };
        self.complete(
            session,
            embed.as_ref(),
            Transition::Complete,
            Evidence {
                approval_fingerprint: None,
                profile: Some(profile),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{embed, engine, engine_with, SERVER_SECRET};
    use super::super::CreateSession;
    use super::*;
    use crate::{
        engine::Providers,
        session::{SessionState, SessionStore},
        store::InMemoryStore,
    };
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CapturingSms {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsSender for CapturingSms {
        async fn send_sms(&self, to: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingSms;

    #[async_trait]
    impl SmsSender for FailingSms {
        async fn send_sms(&self, _to: &str, _body: &str) -> anyhow::Result<()> {
            anyhow::bail!("gateway down")
        }
    }

    fn code_in(body: &str) -> Option<String> {
        body.split_whitespace()
            .map(|word| word.trim_end_matches('.'))
            .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
    }

    async fn new_session(engine: &Engine, template_token: &str) -> Result<String> {
        let created = engine
            .create_session(CreateSession {
                template_token: Some(template_token.to_string()),
                fingerprint: Some("fp1".to_string()),
                client_origin: None,
                user: None,
            })
            .await?;
        Ok(created.session.token)
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_and_session_is_untouched() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let engine = engine(store.clone());
        let token = new_session(&engine, &config.template_token).await?;

        let digest = otp_digest(SERVER_SECRET.as_bytes(), &token, "+15550100", "123456")?;
        let (carrier, _) = engine.sign_carrier(
            &token,
            "+15550100",
            Some(digest),
            CarrierPurpose::Otp,
            600,
        )?;

        let result = engine.verify_otp(&carrier, "000000").await;
        assert!(matches!(result, Err(EngineError::InvalidCredential)));
        let session = store.select_by_token(&token).await?.context("session vanished")?;
        assert_eq!(session.state, SessionState::Init);
        assert!(session.verified_at.is_none());

        let completion = engine.verify_otp(&carrier, "123456").await?;
        assert_eq!(completion.session.state, SessionState::Verified);
        assert_eq!(completion.session.external_user_id.as_deref(), Some("+15550100"));
        Ok(())
    }

    #[tokio::test]
    async fn delivered_code_verifies_the_session() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let sms = Arc::new(CapturingSms::default());
        let engine = engine_with(
            store,
            Providers {
                sms: Some(sms.clone()),
                ..Providers::default()
            },
        );
        let token = new_session(&engine, &config.template_token).await?;

        let challenge = engine
            .send_otp(OtpRequest {
                session_token: token.clone(),
                channel: OtpChannel::Phone,
                identifier: "+15550100".to_string(),
            })
            .await?;
        let (to, body) = sms
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .first()
            .cloned()
            .context("nothing sent")?;
        assert_eq!(to, "+15550100");
        let code = code_in(&body).context("no code in message")?;
        assert!(!challenge.carrier.contains(&code));

        let completion = engine.verify_otp(&challenge.carrier, &code).await?;
        assert_eq!(completion.session.token, token);
        assert!(completion.session.identity_id.is_some());

        // A second redemption finds the session already verified.
        assert!(matches!(
            engine.verify_otp(&challenge.carrier, &code).await,
            Err(EngineError::InvalidState { action: "verify", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn delivery_failure_still_returns_a_carrier() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let engine = engine_with(
            store,
            Providers {
                sms: Some(Arc::new(FailingSms)),
                ..Providers::default()
            },
        );
        let token = new_session(&engine, &config.template_token).await?;
        let challenge = engine
            .send_otp(OtpRequest {
                session_token: token,
                channel: OtpChannel::Phone,
                identifier: "+15550100".to_string(),
            })
            .await?;
        assert!(!challenge.carrier.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn magic_link_carrier_is_not_an_otp_carrier() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let config = embed(None);
        store.insert_embed(config.clone());
        let engine = engine(store);
        let token = new_session(&engine, &config.template_token).await?;
        let (carrier, _) = engine.sign_carrier(&token, "ada@example.com", None, CarrierPurpose::MagicLink, 900)?;
        assert!(matches!(
            engine.verify_otp(&carrier, "123456").await,
            Err(EngineError::InvalidCredential)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn disabled_channel_is_rejected() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let mut config = embed(None);
        config.methods.phone_otp = false;
        store.insert_embed(config.clone());
        let engine = engine(store);
        let token = new_session(&engine, &config.template_token).await?;
        let result = engine
            .send_otp(OtpRequest {
                session_token: token,
                channel: OtpChannel::Phone,
                identifier: "+15550100".to_string(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::MethodDisabled("phone_otp"))));
        Ok(())
    }
}
