use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use super::{EmailMessage, EmailSender};

const RESEND_API: &str = "https://api.resend.com";

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct ResendEmailSender {
    api_key: SecretString,
    from: String,
    base_url: String,
    http: reqwest::Client,
}

impl ResendEmailSender {
    #[must_use]
    pub fn new(api_key: SecretString, from: String, http: reqwest::Client) -> Self {
        Self {
            api_key,
            from,
            base_url: RESEND_API.to_string(),
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
impl EmailSender for ResendEmailSender {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let payload = SendEmailRequest {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };
        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Unable to contact Resend")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Resend request failed ({status}): {body}"));
        }
        debug!(to = %message.to, "Email accepted by Resend");
        Ok(())
    }
}
