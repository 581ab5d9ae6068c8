//! Outbound delivery of codes and links.
//!
//! Delivery never gates a verification flow: callers log a failed send and
//! carry on, so the client still gets its carrier token.

mod resend;
mod twilio;

pub use resend::ResendEmailSender;
pub use twilio::TwilioSmsSender;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogSender;

#[async_trait]
impl SmsSender for LogSender {
    async fn send_sms(&self, to: &str, body: &str) -> Result<()> {
        info!(to, body, "sms send stub");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for LogSender {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            text = %message.text,
            "email send stub"
        );
        Ok(())
    }
}

/// HTTP client shared by provider integrations, with a bounded timeout.
///
/// # Errors
/// Returns an error if the client cannot be built.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
