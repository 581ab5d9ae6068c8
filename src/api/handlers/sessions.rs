//! Session lifecycle endpoints driven by the widget and the pairing device.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use super::{
    request_origin,
    types::{
        ApproveRequest, CreateSessionRequest, CreateSessionResponse, LoadedRequest,
        SessionStateResponse, VerifiedResponse,
    },
};
use crate::{
    api::error::ErrorBody,
    engine::Engine,
    error::EngineError,
    session::StateEvent,
    verify::{Approval, CreateSession, LoadReport},
};

#[utoipa::path(
    post,
    path = "/v1/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Embed is not an auth component", body = ErrorBody),
        (status = 403, description = "Embed is inactive", body = ErrorBody),
        (status = 404, description = "Unknown embed", body = ErrorBody)
    ),
    tag = "sessions"
)]
pub async fn create(
    headers: HeaderMap,
    engine: Extension<Arc<Engine>>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, EngineError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let created = engine
        .create_session(CreateSession {
            template_token: request.template_token,
            fingerprint: request.fingerprint,
            client_origin: request.client_origin.or_else(|| request_origin(&headers)),
            user: request.identity.into_profile(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse::from(created))))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{token}",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Current state", body = StateEvent),
        (status = 404, description = "Unknown session", body = ErrorBody)
    ),
    tag = "sessions"
)]
/// Polling fallback for clients that cannot hold an event stream open.
pub async fn state(
    Path(token): Path<String>,
    engine: Extension<Arc<Engine>>,
) -> Result<impl IntoResponse, EngineError> {
    Ok(Json(engine.notifier().current(&token).await?))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{token}/loaded",
    params(("token" = String, Path, description = "Session token")),
    request_body = LoadedRequest,
    responses(
        (status = 200, description = "Session loaded, or already further along", body = SessionStateResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    ),
    tag = "sessions"
)]
pub async fn loaded(
    Path(token): Path<String>,
    engine: Extension<Arc<Engine>>,
    payload: Option<Json<LoadedRequest>>,
) -> Result<impl IntoResponse, EngineError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let session = engine
        .mark_loaded(
            &token,
            LoadReport {
                fingerprint: request.fingerprint,
                role: request.role,
                user: request.identity.into_profile(),
            },
        )
        .await?;
    Ok(Json(SessionStateResponse::from(session)))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{token}/scan",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Session scanned", body = SessionStateResponse),
        (status = 403, description = "QR pairing is disabled for this embed", body = ErrorBody),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session cannot be scanned yet", body = ErrorBody)
    ),
    tag = "sessions"
)]
/// Target of the pairing URL encoded in the QR code.
pub async fn scan(
    Path(token): Path<String>,
    engine: Extension<Arc<Engine>>,
) -> Result<impl IntoResponse, EngineError> {
    let session = engine.scan(&token).await?;
    Ok(Json(SessionStateResponse::from(session)))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{token}/approve",
    params(("token" = String, Path, description = "Session token")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Session verified", body = VerifiedResponse),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session is not awaiting approval", body = ErrorBody)
    ),
    tag = "sessions"
)]
pub async fn approve(
    Path(token): Path<String>,
    engine: Extension<Arc<Engine>>,
    payload: Option<Json<ApproveRequest>>,
) -> Result<impl IntoResponse, EngineError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let completion = engine
        .approve(
            &token,
            Approval {
                fingerprint: request.fingerprint,
                user: request.identity.into_profile(),
            },
        )
        .await?;
    Ok(Json(VerifiedResponse::from(completion)))
}
