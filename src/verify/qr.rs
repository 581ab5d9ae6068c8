//! Session creation and QR device pairing.

use base64ct::{Base64, Encoding};
use qrcode::{render::svg, QrCode};
use tracing::{debug, info};

use super::{new_session_token, require_method, Completion, Evidence};
use crate::{
    embed::AuthMethod,
    engine::Engine,
    error::{EngineError, Result},
    identity::ExternalProfile,
    session::{machine, NewSession, Session, SessionPatch, Transition},
};

#[derive(Debug, Clone, Default)]
pub struct CreateSession {
    /// `None` creates a legacy session that belongs to no embed.
    pub template_token: Option<String>,
    pub fingerprint: Option<String>,
    pub client_origin: Option<String>,
    /// Identity the embedding application already knows about.
    pub user: Option<ExternalProfile>,
}

/// What the widget reports once it is on screen.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub fingerprint: Option<String>,
    /// Role to fall back on when the embed binds none.
    pub role: Option<String>,
    pub user: Option<ExternalProfile>,
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: Session,
    pub pairing_url: String,
    /// `data:image/svg+xml;base64,...`, only when the embed offers QR.
    pub qr_image_data: Option<String>,
}

/// Second-device approval.
#[derive(Debug, Clone, Default)]
pub struct Approval {
    pub fingerprint: Option<String>,
    /// Identity the second device is already signed in as, if any.
    pub user: Option<ExternalProfile>,
}

/// Render `url` as an SVG QR code wrapped in a data URL.
///
/// # Errors
/// `Configuration` when the URL does not fit in a QR code.
pub fn qr_data_url(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes())
        .map_err(|err| EngineError::Configuration(format!("failed to encode QR code: {err}")))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build();
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        Base64::encode_string(image.as_bytes())
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Engine {
    /// Start a verification attempt for an auth embed.
    ///
    /// # Errors
    /// `NotFound`/`Inactive` for the embed, `UnsupportedComponent` for non-auth
    /// embeds, `Store` on I/O failure.
    pub async fn create_session(&self, request: CreateSession) -> Result<CreatedSession> {
        let embed = match request.template_token.as_deref() {
            Some(template_token) => Some(self.embeds.resolve_auth(template_token).await?),
            None => None,
        };

        let user = request.user.unwrap_or_default();
        let session = machine::create(
            self.sessions.as_ref(),
            NewSession {
                token: new_session_token(),
                embed_id: embed.as_ref().map(|embed| embed.id),
                origin_fingerprint: non_empty(request.fingerprint),
                external_user_id: non_empty(Some(user.external_id)),
                user_email: non_empty(user.email),
                user_name: non_empty(user.name),
                role: embed.as_ref().and_then(|embed| embed.role.clone()),
                client_origin: non_empty(request.client_origin),
            },
        )
        .await?;

        let pairing_url = self.config.pairing_url(&session.token);
        let qr_image_data = if embed.as_ref().map_or(true, |embed| embed.methods.qr) {
            Some(qr_data_url(&pairing_url)?)
        } else {
            None
        };

        Ok(CreatedSession {
            session,
            pairing_url,
            qr_image_data,
        })
    }

    /// The widget has been displayed on the original device.
    ///
    /// # Errors
    /// `NotFound` or `Store`.
    pub async fn mark_loaded(&self, token: &str, report: LoadReport) -> Result<Session> {
        let user = report.user.unwrap_or_default();
        let patch = SessionPatch {
            origin_fingerprint: non_empty(report.fingerprint),
            external_user_id: non_empty(Some(user.external_id)),
            user_email: non_empty(user.email),
            user_name: non_empty(user.name),
            role: non_empty(report.role),
            ..SessionPatch::default()
        };
        machine::load(self.sessions.as_ref(), token, &patch).await
    }

    /// The pairing URL was opened on a second device.
    ///
    /// # Errors
    /// `NotFound`, `MethodDisabled` when the embed has QR switched off,
    /// `InvalidState` from `pending`, or `Store`.
    pub async fn scan(&self, token: &str) -> Result<Session> {
        let session = machine::current(self.sessions.as_ref(), token).await?;
        let embed = self.session_embed(&session).await?;
        require_method(embed.as_ref(), AuthMethod::Qr)?;
        let scanned = machine::scan(self.sessions.as_ref(), token).await?;
        debug!(state = %scanned.state, "Pairing URL opened");
        Ok(scanned)
    }

    /// Explicit approval from the scanning device.
    ///
    /// # Errors
    /// `InvalidState` unless the session is `scanned`; see [`Engine::complete`].
    pub async fn approve(&self, token: &str, approval: Approval) -> Result<Completion> {
        let (session, embed) = self.open_for(token, Transition::Approve, AuthMethod::Qr).await?;
        let approval_fingerprint = non_empty(approval.fingerprint);
        if let (Some(origin), Some(approver)) = (
            session.origin_fingerprint.as_deref(),
            approval_fingerprint.as_deref(),
        ) {
            if origin != approver {
                info!("Approval came from a different device than the origin");
            }
        }
        self.complete(
            session,
            embed.as_ref(),
            Transition::Approve,
            Evidence {
                approval_fingerprint,
                profile: approval.user,
            },
        )
        .await
    }
}
