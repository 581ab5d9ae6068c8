use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::types::MagicLinkSendRequest;
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError, verify::MagicLinkRequest};

#[derive(Deserialize, IntoParams, Debug)]
pub struct MagicLinkQuery {
    /// Carrier token from the emailed link.
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/v1/magic-link/send",
    request_body = MagicLinkSendRequest,
    responses(
        (status = 202, description = "Link emailed"),
        (status = 403, description = "Email sign-in is disabled for this embed", body = ErrorBody),
        (status = 404, description = "Unknown session", body = ErrorBody)
    ),
    tag = "magic-link"
)]
pub async fn send(
    engine: Extension<Arc<Engine>>,
    Json(request): Json<MagicLinkSendRequest>,
) -> Result<impl IntoResponse, EngineError> {
    engine
        .send_magic_link(MagicLinkRequest {
            session_token: request.session_token,
            email: request.email,
        })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    get,
    path = "/v1/magic-link/verify",
    params(MagicLinkQuery),
    responses(
        (status = 303, description = "Session verified; redirect to the destination"),
        (status = 401, description = "Expired or forged link", body = ErrorBody),
        (status = 409, description = "Link already used", body = ErrorBody)
    ),
    tag = "magic-link"
)]
/// Target of the emailed link.
pub async fn verify(
    engine: Extension<Arc<Engine>>,
    Query(query): Query<MagicLinkQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let completion = engine.verify_magic_link(&query.token).await?;
    Ok(Redirect::to(&completion.redirect))
}
