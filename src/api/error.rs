//! HTTP mapping for [`EngineError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::error::EngineError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `invalid_state`.
    pub error: String,
    pub message: String,
}

impl EngineError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Inactive | Self::MethodDisabled(_) => StatusCode::FORBIDDEN,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::UnsupportedComponent(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs.
        let message = match &self {
            Self::Configuration(_) | Self::Store(_) => {
                error!(error = %self, code = self.code(), "Request failed");
                "internal error".to_string()
            }
            Self::Upstream(_) => {
                error!(error = %self, "Upstream provider failed");
                self.to_string()
            }
            _ => self.to_string(),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
