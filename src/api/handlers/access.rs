use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::{login::extract_auth_token, types::AccessCheckResponse};
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError};

#[derive(Deserialize, IntoParams, Debug)]
pub struct AccessQuery {
    /// Application path to check, e.g. `/admin/users`.
    pub path: String,
}

#[utoipa::path(
    get,
    path = "/v1/access/check",
    params(AccessQuery),
    responses(
        (status = 200, description = "Decision for the signed-in role", body = AccessCheckResponse),
        (status = 401, description = "Missing, forged or expired auth token", body = ErrorBody)
    ),
    tag = "access"
)]
/// Route permission check for the role carried by the `auth_token` cookie.
pub async fn check(
    headers: HeaderMap,
    engine: Extension<Arc<Engine>>,
    Query(query): Query<AccessQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let token = extract_auth_token(&headers).ok_or(EngineError::InvalidCredential)?;
    let (claims, _) = engine.issuer().verify_sso(&token).await?;
    let allowed = engine.access().check(&query.path, &claims.role).await?;
    Ok(Json(AccessCheckResponse {
        path: query.path,
        role: claims.role,
        allowed,
    }))
}
