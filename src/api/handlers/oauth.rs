use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::request_origin;
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError, oauth::Provider};

#[derive(Deserialize, IntoParams, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeQuery {
    pub template_token: String,
    /// Page to come back to; defaults to the request's `Origin` header.
    pub client_origin: Option<String>,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

#[utoipa::path(
    get,
    path = "/v1/oauth/{provider}/authorize",
    params(
        ("provider" = String, Path, description = "`google` or `github`"),
        AuthorizeQuery
    ),
    responses(
        (status = 303, description = "Redirect to the provider's consent page"),
        (status = 403, description = "Provider is disabled for this embed", body = ErrorBody),
        (status = 404, description = "Unknown provider or embed", body = ErrorBody),
        (status = 500, description = "Provider is not configured", body = ErrorBody)
    ),
    tag = "oauth"
)]
pub async fn authorize(
    Path(provider): Path<String>,
    headers: HeaderMap,
    engine: Extension<Arc<Engine>>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let provider: Provider = provider.parse()?;
    let url = engine
        .authorize_url(
            provider,
            &query.template_token,
            query.client_origin.or_else(|| request_origin(&headers)),
        )
        .await?;
    Ok(Redirect::to(&url))
}

#[utoipa::path(
    get,
    path = "/v1/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "`google` or `github`"),
        CallbackQuery
    ),
    responses(
        (status = 303, description = "Session verified; redirect to the destination"),
        (status = 401, description = "Forged or expired state", body = ErrorBody),
        (status = 502, description = "Provider rejected the code", body = ErrorBody)
    ),
    tag = "oauth"
)]
pub async fn callback(
    Path(provider): Path<String>,
    engine: Extension<Arc<Engine>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let provider: Provider = provider.parse()?;
    let completion = engine
        .oauth_callback(provider, &query.code, &query.state)
        .await?;
    Ok(Redirect::to(&completion.redirect))
}
