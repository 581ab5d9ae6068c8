//! Engine error taxonomy.
//!
//! Everything the engine reports to a caller is one of these variants; the HTTP
//! mapping lives in `api::error`.

use thiserror::Error;

use crate::embed::ComponentKind;
use crate::session::SessionState;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown embed, session or provider. Never conflated with `InvalidState`.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("embed is inactive")]
    Inactive,

    #[error("cannot {action} a session in state {current}")]
    InvalidState {
        action: &'static str,
        current: SessionState,
    },

    #[error("invalid credential")]
    InvalidCredential,

    #[error("component {0} does not support authentication")]
    UnsupportedComponent(ComponentKind),

    #[error("authentication method {0} is disabled for this embed")]
    MethodDisabled(&'static str),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code used in response bodies and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Inactive => "inactive",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidCredential => "invalid_credential",
            Self::UnsupportedComponent(_) => "unsupported_component",
            Self::MethodDisabled(_) => "method_disabled",
            Self::Configuration(_) => "configuration_error",
            Self::Upstream(_) => "upstream_provider_error",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<crate::token::Error> for EngineError {
    // Any token that fails to decode, verify or match its purpose is a bad credential.
    fn from(_: crate::token::Error) -> Self {
        Self::InvalidCredential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_invalid_state_are_distinct() {
        let missing = EngineError::NotFound("session");
        let conflict = EngineError::InvalidState {
            action: "approve",
            current: SessionState::Verified,
        };
        assert_ne!(missing.code(), conflict.code());
        assert_eq!(missing.to_string(), "session not found");
        assert_eq!(
            conflict.to_string(),
            "cannot approve a session in state verified"
        );
    }

    #[test]
    fn token_errors_collapse_to_invalid_credential() {
        let err: EngineError = crate::token::Error::Expired.into();
        assert!(matches!(err, EngineError::InvalidCredential));
    }
}
