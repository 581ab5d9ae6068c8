use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, Json};

use super::types::{CredentialsRequest, VerifiedResponse};
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError, verify::CredentialLogin};

#[utoipa::path(
    post,
    path = "/v1/credentials/verify",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Session verified", body = VerifiedResponse),
        (status = 401, description = "Unknown email or wrong password", body = ErrorBody),
        (status = 403, description = "Password sign-in is disabled for this embed", body = ErrorBody),
        (status = 409, description = "Session is already verified", body = ErrorBody)
    ),
    tag = "credentials"
)]
pub async fn verify(
    engine: Extension<Arc<Engine>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let completion = engine
        .verify_credentials(CredentialLogin {
            session_token: request.session_token,
            email: request.email,
            password: request.password,
        })
        .await?;
    Ok(Json(VerifiedResponse::from(completion)))
}
