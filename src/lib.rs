//! # Pairgate (Session Verification Engine)
//!
//! `pairgate` lets a site owner drop a "connect your device" widget into any
//! page and receive a signed redirect that logs the visitor in. A widget is an
//! **embed**, addressed by a public template token; each verification attempt is
//! a **session**, addressed by its own opaque token.
//!
//! ## Session lifecycle
//!
//! ```text
//! init | pending ──load──▶ loaded ──scan──▶ scanned ──approve──▶ verified
//!        └───────────── OTP / magic link / credentials / social ──────▶ verified
//! ```
//!
//! - Transitions only move forward. Each one is a single conditional update
//!   keyed by token and source state, so concurrent attempts cannot both win.
//! - `verified` is terminal. Its timestamp and the resolved destination are
//!   written together, exactly once.
//!
//! ## Notifications
//!
//! The original page subscribes to a server-sent event stream. It gets the
//! current state first, then every forward change, with keepalive comments in
//! between. The stream ends after `verified`.
//!
//! ## SSO redirect
//!
//! When the embed carries a signing secret, the destination is wrapped in
//! `{appOrigin}/api/auth/login?token=<jwt>&redirectUrl=<dest>`. The token is an
//! HS256 JWT `{userId, embedId, role}` signed with that embed's secret.

pub mod access;
pub mod api;
pub mod cli;
pub mod delivery;
pub mod embed;
pub mod engine;
pub mod error;
pub mod identity;
pub mod issuer;
pub mod oauth;
pub mod session;
pub mod store;
pub mod token;
pub mod verify;

pub use engine::{Backends, Engine, EngineConfig, Providers};
pub use error::EngineError;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
