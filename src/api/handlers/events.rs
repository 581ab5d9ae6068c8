use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Extension, Path},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use futures::StreamExt;
use tracing::warn;

use crate::{
    api::error::ErrorBody,
    engine::Engine,
    error::EngineError,
    session::{Notice, StateEvent},
};

fn to_event(notice: Notice) -> Event {
    match notice {
        Notice::State(state) => Event::default()
            .event("state")
            .json_data(&state)
            .unwrap_or_else(|err| {
                warn!("Failed to encode state event: {err}");
                Event::default().comment("encode error")
            }),
        Notice::KeepAlive => Event::default().comment("keepalive"),
    }
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{token}/events",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Server-sent `state` events, current state first", body = StateEvent, content_type = "text/event-stream"),
        (status = 404, description = "Unknown session", body = ErrorBody)
    ),
    tag = "sessions"
)]
/// Live state changes for the original page. Ends after `verified`.
pub async fn events(
    Path(token): Path<String>,
    engine: Extension<Arc<Engine>>,
) -> Result<impl IntoResponse, EngineError> {
    let notices = engine.notifier().subscribe(&token).await?;
    let stream = notices.map(|notice| Ok::<_, Infallible>(to_event(notice)));
    Ok(Sse::new(stream))
}
