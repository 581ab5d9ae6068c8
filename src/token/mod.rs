//! Signed, short-lived tokens.
//!
//! Three token shapes travel through the engine, all HS256 JWTs:
//!
//! - **SSO** (`SsoClaims`): minted for downstream apps, signed with the embed's own
//!   secret, ~1 day.
//! - **OAuth state** (`OAuthStateClaims`): binds a social-login round trip to an
//!   embed and originating page, signed with the server secret, ~10 minutes.
//! - **Carrier** (`CarrierClaims`): carries an OTP or magic-link challenge back to
//!   the client so nothing has to be stored server-side, server secret, 10-15 minutes.

mod error;
pub mod jwt;

pub use error::Error;
pub use jwt::Expiring;

use serde::{Deserialize, Serialize};

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SsoClaims {
    pub user_id: String,
    pub embed_id: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Expiring for SsoClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStateClaims {
    pub embed_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_origin: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Expiring for OAuthStateClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// What a carrier token may be redeemed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CarrierPurpose {
    Otp,
    MagicLink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CarrierClaims {
    pub session_token: String,
    pub identifier: String,
    /// Keyed digest of the code, never the code itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    pub purpose: CarrierPurpose,
    pub iat: i64,
    pub exp: i64,
}

impl Expiring for CarrierClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl CarrierClaims {
    /// Reject carriers minted for another flow (an OTP carrier has no business
    /// being redeemed as a magic link, and vice versa).
    ///
    /// # Errors
    /// Returns `Error::Purpose` on mismatch.
    pub fn expect_purpose(self, purpose: CarrierPurpose) -> Result<Self, Error> {
        if self.purpose == purpose {
            Ok(self)
        } else {
            Err(Error::Purpose)
        }
    }
}
