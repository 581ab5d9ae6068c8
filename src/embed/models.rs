use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid embeds.{column} value: {value}"),
    )))
}

/// What an embed renders. Only the auth kinds may enter the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    QrAuth,
    MobileOtp,
    MagicLink,
    SocialLogin,
    PricingCard,
    FounderProfile,
    ContactForm,
    Chatbot,
}

impl ComponentKind {
    #[must_use]
    pub fn is_auth(self) -> bool {
        matches!(
            self,
            Self::QrAuth | Self::MobileOtp | Self::MagicLink | Self::SocialLogin
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QrAuth => "qr_auth",
            Self::MobileOtp => "mobile_otp",
            Self::MagicLink => "magic_link",
            Self::SocialLogin => "social_login",
            Self::PricingCard => "pricing_card",
            Self::FounderProfile => "founder_profile",
            Self::ContactForm => "contact_form",
            Self::Chatbot => "chatbot",
        }
    }

    /// Parse the persisted `embeds.component_type` value.
    ///
    /// # Errors
    /// Returns a decode error for values outside the closed set.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "qr_auth" => Ok(Self::QrAuth),
            "mobile_otp" => Ok(Self::MobileOtp),
            "magic_link" => Ok(Self::MagicLink),
            "social_login" => Ok(Self::SocialLogin),
            "pricing_card" => Ok(Self::PricingCard),
            "founder_profile" => Ok(Self::FounderProfile),
            "contact_form" => Ok(Self::ContactForm),
            "chatbot" => Ok(Self::Chatbot),
            _ => Err(decode_error("component_type", value)),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethods {
    pub qr: bool,
    pub phone_otp: bool,
    /// Email OTP and magic link share one switch.
    pub email_otp: bool,
    pub password: bool,
    pub google: bool,
    pub github: bool,
}

/// One switch in [`AuthMethods`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Qr,
    PhoneOtp,
    EmailOtp,
    Password,
    Google,
    GitHub,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::PhoneOtp => "phone_otp",
            Self::EmailOtp => "email_otp",
            Self::Password => "password",
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }
}

impl AuthMethods {
    #[must_use]
    pub fn allows(&self, method: AuthMethod) -> bool {
        match method {
            AuthMethod::Qr => self.qr,
            AuthMethod::PhoneOtp => self.phone_otp,
            AuthMethod::EmailOtp => self.email_otp,
            AuthMethod::Password => self.password,
            AuthMethod::Google => self.google,
            AuthMethod::GitHub => self.github,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    #[default]
    None,
    DeviceParity,
    SplitTest,
}

impl RoutingRule {
    /// # Errors
    /// Returns a decode error for unknown rules.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "none" => Ok(Self::None),
            "device_parity" => Ok(Self::DeviceParity),
            "split_test" => Ok(Self::SplitTest),
            _ => Err(decode_error("routing_rule", value)),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DeviceParity => "device_parity",
            Self::SplitTest => "split_test",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ActivePath {
    #[default]
    A,
    B,
}

impl ActivePath {
    /// # Errors
    /// Returns a decode error for anything but `A` or `B`.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            _ => Err(decode_error("active_path", value)),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    pub success_url_a: Option<String>,
    pub success_url_b: Option<String>,
    pub active_path: ActivePath,
    pub routing_rule: RoutingRule,
}

impl Destinations {
    /// Configured URL for a path; blank strings count as unset.
    #[must_use]
    pub fn url_for(&self, path: ActivePath) -> Option<&str> {
        let url = match path {
            ActivePath::A => self.success_url_a.as_deref(),
            ActivePath::B => self.success_url_b.as_deref(),
        };
        url.map(str::trim).filter(|url| !url.is_empty())
    }

    /// All non-empty configured success URLs.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        [ActivePath::A, ActivePath::B]
            .into_iter()
            .filter_map(|path| self.url_for(path))
    }
}

#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub id: Uuid,
    pub template_token: String,
    pub component: ComponentKind,
    pub methods: AuthMethods,
    pub destinations: Destinations,
    pub signing_secret: Option<SecretString>,
    /// Name of the bound role, if any.
    pub role: Option<String>,
    pub active: bool,
}

impl<'r> FromRow<'r, PgRow> for EmbedConfig {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let component: String = row.try_get("component_type")?;
        let routing_rule: String = row.try_get("routing_rule")?;
        let active_path: String = row.try_get("active_path")?;
        let signing_secret: Option<String> = row.try_get("signing_secret")?;
        Ok(Self {
            id: row.try_get("id")?,
            template_token: row.try_get("template_token")?,
            component: ComponentKind::from_db(&component)?,
            methods: AuthMethods {
                qr: row.try_get("method_qr")?,
                phone_otp: row.try_get("method_phone_otp")?,
                email_otp: row.try_get("method_email_otp")?,
                password: row.try_get("method_password")?,
                google: row.try_get("method_google")?,
                github: row.try_get("method_github")?,
            },
            destinations: Destinations {
                success_url_a: row.try_get("success_url_a")?,
                success_url_b: row.try_get("success_url_b")?,
                active_path: ActivePath::from_db(&active_path)?,
                routing_rule: RoutingRule::from_db(&routing_rule)?,
            },
            signing_secret: signing_secret
                .filter(|secret| !secret.is_empty())
                .map(SecretString::from),
            role: row.try_get("role_name")?,
            active: row.try_get("active")?,
        })
    }
}
