use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::engine::Engine;

pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{
    access, credentials, embeds, events, health, login, magic_link, oauth, otp, root, sessions,
};

/// All routes with tracing, request ids, and CORS applied.
///
/// The widget runs inside third-party pages, so CORS accepts any origin;
/// credentials are never sent cross-origin.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/v1/embeds/:template_token", get(embeds::embed))
        .route("/v1/sessions", post(sessions::create))
        .route("/v1/sessions/:token", get(sessions::state))
        .route("/v1/sessions/:token/loaded", post(sessions::loaded))
        .route("/v1/sessions/:token/scan", get(sessions::scan))
        .route("/v1/sessions/:token/approve", post(sessions::approve))
        .route("/v1/sessions/:token/events", get(events::events))
        .route("/v1/otp/send", post(otp::send))
        .route("/v1/otp/verify", post(otp::verify))
        .route("/v1/magic-link/send", post(magic_link::send))
        .route("/v1/magic-link/verify", get(magic_link::verify))
        .route("/v1/credentials/verify", post(credentials::verify))
        .route("/v1/oauth/:provider/authorize", get(oauth::authorize))
        .route("/v1/oauth/:provider/callback", get(oauth::callback))
        .route("/api/auth/login", get(login::login))
        .route("/v1/access/check", get(access::check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(engine)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, engine: Arc<Engine>) -> Result<()> {
    let app = router(engine);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
