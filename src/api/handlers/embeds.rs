use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};

use super::types::EmbedInfo;
use crate::{api::error::ErrorBody, engine::Engine, error::EngineError};

#[utoipa::path(
    get,
    path = "/v1/embeds/{template_token}",
    params(("template_token" = String, Path, description = "Public embed template token")),
    responses(
        (status = 200, description = "Widget configuration", body = EmbedInfo),
        (status = 403, description = "Embed is inactive", body = ErrorBody),
        (status = 404, description = "Unknown embed", body = ErrorBody)
    ),
    tag = "embeds"
)]
/// Widget configuration; callers use `component` to decide whether to start a session.
pub async fn embed(
    Path(template_token): Path<String>,
    engine: Extension<Arc<Engine>>,
) -> Result<impl IntoResponse, EngineError> {
    let embed = engine.embeds().resolve(&template_token).await?;
    Ok(Json(EmbedInfo::from(embed)))
}
