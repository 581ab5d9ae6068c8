use async_trait::async_trait;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{OAuthClient, OAuthProfile, Provider};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize: String,
    pub token: String,
    pub profile: String,
    /// GitHub only: fallback for profiles that hide their email.
    pub emails: Option<String>,
    pub scope: &'static str,
}

impl ProviderEndpoints {
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Google => Self {
                authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token: "https://oauth2.googleapis.com/token".to_string(),
                profile: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
                emails: None,
                scope: "openid email profile",
            },
            Provider::GitHub => Self {
                authorize: "https://github.com/login/oauth/authorize".to_string(),
                token: "https://github.com/login/oauth/access_token".to_string(),
                profile: "https://api.github.com/user".to_string(),
                emails: Some("https://api.github.com/user/emails".to_string()),
                scope: "read:user user:email",
            },
        }
    }
}

pub struct HttpOAuthClient {
    provider: Provider,
    client_id: String,
    client_secret: SecretString,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn upstream(provider: Provider, what: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Upstream(format!("{provider} {what}: {err}"))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl HttpOAuthClient {
    #[must_use]
    pub fn new(
        provider: Provider,
        client_id: String,
        client_secret: SecretString,
        http: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            client_id,
            client_secret,
            endpoints: ProviderEndpoints::for_provider(provider),
            http,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, access_token: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| upstream(self.provider, "request failed", err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream(self.provider, "request rejected", status));
        }
        response
            .json()
            .await
            .map_err(|err| upstream(self.provider, "returned invalid JSON", err))
    }

    async fn primary_email(&self, access_token: &str) -> Result<Option<String>> {
        let Some(url) = self.endpoints.emails.as_deref() else {
            return Ok(None);
        };
        let emails: Vec<GitHubEmail> = self.get_json(url, access_token).await?;
        Ok(emails
            .into_iter()
            .find(|email| email.primary && email.verified)
            .map(|email| email.email))
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.authorize).map_err(|err| {
            EngineError::Configuration(format!("invalid {} authorize endpoint: {err}", self.provider))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", self.endpoints.scope)
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|err| upstream(self.provider, "token request failed", err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream(self.provider, "token request rejected", status));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| upstream(self.provider, "token response invalid", err))?;
        match (token.access_token, token.error) {
            (Some(access_token), _) => Ok(access_token),
            (None, Some(error)) => Err(upstream(self.provider, "token exchange failed", error)),
            (None, None) => Err(upstream(self.provider, "token exchange failed", "no access token")),
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile> {
        let profile: Value = self.get_json(&self.endpoints.profile, access_token).await?;
        // Google reports `sub`, GitHub a numeric `id`.
        let provider_user_id = string_field(&profile, "sub")
            .or_else(|| string_field(&profile, "id"))
            .ok_or_else(|| upstream(self.provider, "profile", "missing user id"))?;
        let mut email = string_field(&profile, "email");
        if email.is_none() {
            debug!(provider = %self.provider, "Profile has no email, asking for the primary one");
            email = self.primary_email(access_token).await?;
        }
        let name = string_field(&profile, "name").or_else(|| string_field(&profile, "login"));
        Ok(OAuthProfile {
            provider: self.provider,
            provider_user_id,
            email,
            name,
        })
    }
}
