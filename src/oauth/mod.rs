//! Social login providers.

mod client;

pub use client::{HttpOAuthClient, ProviderEndpoints};

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::Result, identity::ExternalProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    GitHub,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = crate::error::EngineError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            _ => Err(crate::error::EngineError::NotFound("provider")),
        }
    }
}

/// Minimal profile returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl OAuthProfile {
    /// Identity key: `{provider}-{providerUserId}`.
    #[must_use]
    pub fn external_id(&self) -> String {
        format!("{}-{}", self.provider, self.provider_user_id)
    }

    #[must_use]
    pub fn into_external(self) -> ExternalProfile {
        ExternalProfile {
            external_id: self.external_id(),
            email: self.email,
            name: self.name,
        }
    }
}

#[async_trait]
pub trait OAuthClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Provider consent page URL carrying our signed `state`.
    ///
    /// # Errors
    /// `Configuration` if the endpoint cannot be built.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String>;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String>;

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile>;
}
