//! SSO landing endpoint for downstream apps.
//!
//! The token's `embedId` claim is only used to find which secret to verify
//! with; nothing else in the request is trusted until the signature checks out.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{
        header::{InvalidHeaderValue, HOST, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use utoipa::IntoParams;

use crate::{
    api::error::ErrorBody,
    embed::EmbedConfig,
    engine::Engine,
    error::EngineError,
    token::{self, SsoClaims},
};

pub(crate) const AUTH_COOKIE_NAME: &str = "auth_token";

#[derive(Deserialize, IntoParams, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    /// SSO token minted at verification.
    pub token: String,
    pub redirect_url: String,
}

#[utoipa::path(
    get,
    path = "/api/auth/login",
    params(LoginQuery),
    responses(
        (status = 307, description = "Cookie set; redirect to `redirectUrl`"),
        (status = 401, description = "Forged or expired token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    engine: Extension<Arc<Engine>>,
    Query(query): Query<LoginQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let (claims, embed) = engine.issuer().verify_sso(&query.token).await?;

    let host = headers.get(HOST).and_then(|value| value.to_str().ok());
    let location = if redirect_allowed(&query.redirect_url, &embed, engine.config().public_url(), host) {
        query.redirect_url
    } else {
        warn!(embed_id = %embed.id, "Refusing redirect to a foreign origin");
        "/".to_string()
    };

    let cookie = auth_cookie(&query.token, &claims, engine.config().cookie_secure())
        .map_err(|err| EngineError::Configuration(format!("invalid auth cookie: {err}")))?;
    let location = HeaderValue::from_str(&location)
        .map_err(|_| EngineError::InvalidCredential)?;

    info!(embed_id = %embed.id, role = %claims.role, "SSO login");
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    response_headers.insert(LOCATION, location);
    Ok((StatusCode::TEMPORARY_REDIRECT, response_headers))
}

/// `HttpOnly` cookie carrying the SSO token for as long as the token is valid.
fn auth_cookie(sso: &str, claims: &SsoClaims, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = claims.exp.saturating_sub(token::now_unix()).max(0);
    let mut cookie = format!("{AUTH_COOKIE_NAME}={sso}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.origin().ascii_serialization())
}

/// Relative paths, the embed's own destination origins, this service, and the
/// host serving the request are allowed; anything else is an open redirect.
fn redirect_allowed(redirect_url: &str, embed: &EmbedConfig, public_url: &str, host: Option<&str>) -> bool {
    if redirect_url.starts_with('/') {
        return !redirect_url.starts_with("//") && !redirect_url.contains('\\');
    }
    let Some(origin) = origin_of(redirect_url) else {
        return false;
    };
    if embed
        .destinations
        .urls()
        .filter_map(origin_of)
        .chain(origin_of(public_url))
        .any(|allowed| allowed == origin)
    {
        return true;
    }
    let authority = Url::parse(redirect_url).ok().and_then(|url| {
        let host = url.host_str()?.to_string();
        Some(url.port().map_or(host.clone(), |port| format!("{host}:{port}")))
    });
    matches!((authority, host), (Some(authority), Some(host)) if authority.eq_ignore_ascii_case(host))
}

/// SSO token from the `auth_token` cookie or a bearer header.
pub(crate) fn extract_auth_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        let trimmed = value.trim();
        if let Some(token) = trimmed
            .strip_prefix("Bearer ")
            .or_else(|| trimmed.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            return Some(token.to_string());
        }
    }
    let value = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == AUTH_COOKIE_NAME).then(|| val.trim().to_string())
    })
}
