use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::SmsSender;

const TWILIO_API: &str = "https://api.twilio.com";

pub struct TwilioSmsSender {
    account_sid: String,
    auth_token: SecretString,
    from: String,
    base_url: String,
    http: reqwest::Client,
}

impl TwilioSmsSender {
    #[must_use]
    pub fn new(account_sid: String, auth_token: SecretString, from: String, http: reqwest::Client) -> Self {
        Self {
            account_sid,
            auth_token,
            from,
            base_url: TWILIO_API.to_string(),
            http,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("To", to), ("From", self.from.as_str()), ("Body", body)])
            .send()
            .await
            .context("Unable to contact Twilio")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Twilio request failed ({status}): {body}"));
        }
        debug!(to, "SMS accepted by Twilio");
        Ok(())
    }
}
