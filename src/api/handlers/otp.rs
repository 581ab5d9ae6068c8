use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use super::types::{OtpSendRequest, OtpSendResponse, OtpVerifyRequest, VerifiedResponse};
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError, verify::OtpRequest};

#[utoipa::path(
    post,
    path = "/v1/otp/send",
    request_body = OtpSendRequest,
    responses(
        (status = 200, description = "Code sent; present the carrier back with the code", body = OtpSendResponse),
        (status = 403, description = "Channel is disabled for this embed", body = ErrorBody),
        (status = 404, description = "Unknown session", body = ErrorBody),
        (status = 409, description = "Session is already verified", body = ErrorBody)
    ),
    tag = "otp"
)]
pub async fn send(
    engine: Extension<Arc<Engine>>,
    Json(request): Json<OtpSendRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let challenge = engine
        .send_otp(OtpRequest {
            session_token: request.session_token,
            channel: request.channel.into(),
            identifier: request.identifier,
        })
        .await?;
    Ok(Json(OtpSendResponse {
        carrier: challenge.carrier,
        expires_at: challenge.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/otp/verify",
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Session verified", body = VerifiedResponse),
        (status = 401, description = "Wrong, expired or forged code", body = ErrorBody),
        (status = 409, description = "Session is already verified", body = ErrorBody)
    ),
    tag = "otp"
)]
pub async fn verify(
    engine: Extension<Arc<Engine>>,
    Json(request): Json<OtpVerifyRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let completion = engine.verify_otp(&request.carrier, &request.code).await?;
    Ok(Json(VerifiedResponse::from(completion)))
}
