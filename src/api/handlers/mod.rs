pub mod access;
pub mod credentials;
pub mod embeds;
pub mod events;
pub mod health;
pub mod login;
pub mod magic_link;
pub mod oauth;
pub mod otp;
pub mod root;
pub mod sessions;
pub mod types;

use axum::http::{header::ORIGIN, HeaderMap};

// common functions for the handlers

/// Page origin reported by the browser, used when the client does not say.
pub(crate) fn request_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|origin| !origin.is_empty() && *origin != "null")
        .map(str::to_string)
}
