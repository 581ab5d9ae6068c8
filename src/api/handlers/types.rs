//! Request/response types for the widget endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    embed::{AuthMethods, ComponentKind, EmbedConfig, RoutingRule},
    identity::ExternalProfile,
    session::{Session, SessionState},
    verify::{Completion, CreatedSession, OtpChannel},
};

/// Identity the embedding application already knows, if any.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SuppliedIdentity {
    #[serde(default, alias = "userId")]
    pub external_user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SuppliedIdentity {
    /// Keyed by the external user id, else by email; `None` when neither is given.
    #[must_use]
    pub fn into_profile(self) -> Option<ExternalProfile> {
        let email = self.email.filter(|email| !email.trim().is_empty());
        let external_id = self
            .external_user_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| email.clone())?;
        Some(ExternalProfile {
            external_id,
            email,
            name: self.name.filter(|name| !name.trim().is_empty()),
        })
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EmbedInfo {
    pub component: ComponentKind,
    pub auth_methods: AuthMethods,
    pub routing_rule: RoutingRule,
}

impl From<EmbedConfig> for EmbedInfo {
    fn from(embed: EmbedConfig) -> Self {
        Self {
            component: embed.component,
            auth_methods: embed.methods,
            routing_rule: embed.destinations.routing_rule,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub template_token: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Defaults to the request's `Origin` header.
    #[serde(default)]
    pub client_origin: Option<String>,
    #[serde(flatten)]
    pub identity: SuppliedIdentity,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_token: String,
    pub state: SessionState,
    pub pairing_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_image_data: Option<String>,
}

impl From<CreatedSession> for CreateSessionResponse {
    fn from(created: CreatedSession) -> Self {
        Self {
            session_token: created.session.token,
            state: created.session.state,
            pairing_url: created.pairing_url,
            qr_image_data: created.qr_image_data,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadedRequest {
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub identity: SuppliedIdentity,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// Identity the approving device is signed in as.
    #[serde(flatten)]
    pub identity: SuppliedIdentity,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateResponse {
    pub session_token: String,
    pub state: SessionState,
}

impl From<Session> for SessionStateResponse {
    fn from(session: Session) -> Self {
        Self {
            session_token: session.token,
            state: session.state,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedResponse {
    pub session_token: String,
    pub state: SessionState,
    /// Where the client should navigate, possibly a signed login redirect.
    pub success_url: String,
}

impl From<Completion> for VerifiedResponse {
    fn from(completion: Completion) -> Self {
        Self {
            session_token: completion.session.token,
            state: completion.session.state,
            success_url: completion.redirect,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Phone,
    Email,
}

impl From<Channel> for OtpChannel {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Phone => Self::Phone,
            Channel::Email => Self::Email,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OtpSendRequest {
    pub session_token: String,
    pub channel: Channel,
    pub identifier: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OtpSendResponse {
    pub carrier: String,
    pub expires_at: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    pub carrier: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MagicLinkSendRequest {
    pub session_token: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub session_token: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub path: String,
    pub role: String,
    pub allowed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn create_session_request_fields_are_optional() -> Result<()> {
        let request: CreateSessionRequest = serde_json::from_str("{}")?;
        assert!(request.template_token.is_none());
        let request: CreateSessionRequest =
            serde_json::from_str(r#"{"templateToken":"tpl","fingerprint":"fp1"}"#)?;
        assert_eq!(request.template_token.as_deref(), Some("tpl"));
        assert_eq!(request.fingerprint.as_deref(), Some("fp1"));
        Ok(())
    }

    #[test]
    fn supplied_identity_accepts_user_id_alias() -> Result<()> {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"templateToken":"tpl","userId":"u-42","email":"ada@example.com","name":"Ada"}"#,
        )?;
        let profile = request.identity.into_profile();
        assert_eq!(
            profile,
            Some(ExternalProfile {
                external_id: "u-42".to_string(),
                email: Some("ada@example.com".to_string()),
                name: Some("Ada".to_string()),
            })
        );

        let email_only: LoadedRequest = serde_json::from_str(r#"{"email":"ada@example.com"}"#)?;
        assert_eq!(
            email_only.identity.into_profile().map(|profile| profile.external_id),
            Some("ada@example.com".to_string())
        );
        let anonymous: ApproveRequest = serde_json::from_str(r#"{"fingerprint":"fp2","name":" "}"#)?;
        assert!(anonymous.identity.into_profile().is_none());
        Ok(())
    }

    #[test]
    fn otp_send_request_uses_lowercase_channels() -> Result<()> {
        let request: OtpSendRequest = serde_json::from_str(
            r#"{"sessionToken":"t","channel":"email","identifier":"ada@example.com"}"#,
        )?;
        assert_eq!(request.channel, Channel::Email);
        assert!(serde_json::from_str::<OtpSendRequest>(
            r#"{"sessionToken":"t","channel":"fax","identifier":"x"}"#
        )
        .is_err());
        Ok(())
    }
}
