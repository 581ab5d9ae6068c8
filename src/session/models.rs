use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Init,
    Pending,
    Loaded,
    Scanned,
    Verified,
}

impl SessionState {
    /// Position along the forward-only path. `Init` and `Pending` are both
    /// starting points and share a rank.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Init | Self::Pending => 0,
            Self::Loaded => 1,
            Self::Scanned => 2,
            Self::Verified => 3,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Verified
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Pending => "pending",
            Self::Loaded => "loaded",
            Self::Scanned => "scanned",
            Self::Verified => "verified",
        }
    }

    /// Parse the persisted `sessions.state` value.
    ///
    /// # Errors
    /// Returns a decode error for unknown states.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "init" => Ok(Self::Init),
            "pending" => Ok(Self::Pending),
            "loaded" => Ok(Self::Loaded),
            "scanned" => Ok(Self::Scanned),
            "verified" => Ok(Self::Verified),
            _ => Err(sqlx::Error::Decode(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid sessions.state value: {value}"),
            )))),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub state: SessionState,
    pub embed_id: Option<Uuid>,
    pub origin_fingerprint: Option<String>,
    pub approval_fingerprint: Option<String>,
    pub external_user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub identity_id: Option<Uuid>,
    pub role: Option<String>,
    pub client_origin: Option<String>,
    /// Resolved destination before any SSO wrapping.
    pub success_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Identifier the SSO token is issued for: the provisioned identity, else
    /// the external id reported by the verifier.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.identity_id
            .map(|id| id.to_string())
            .or_else(|| self.external_user_id.clone())
    }
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        Ok(Self {
            token: row.try_get("token")?,
            state: SessionState::from_db(&state)?,
            embed_id: row.try_get("embed_id")?,
            origin_fingerprint: row.try_get("origin_fingerprint")?,
            approval_fingerprint: row.try_get("approval_fingerprint")?,
            external_user_id: row.try_get("external_user_id")?,
            user_email: row.try_get("user_email")?,
            user_name: row.try_get("user_name")?,
            identity_id: row.try_get("identity_id")?,
            role: row.try_get("role")?,
            client_origin: row.try_get("client_origin")?,
            success_url: row.try_get("success_url")?,
            created_at: row.try_get("created_at")?,
            loaded_at: row.try_get("loaded_at")?,
            scanned_at: row.try_get("scanned_at")?,
            verified_at: row.try_get("verified_at")?,
        })
    }
}

/// Fields supplied when a session row is created.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub token: String,
    pub embed_id: Option<Uuid>,
    pub origin_fingerprint: Option<String>,
    /// Identity the embedding application supplied, if any.
    pub external_user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub role: Option<String>,
    pub client_origin: Option<String>,
}

impl NewSession {
    /// Starting state: `init` once the original device is known, else `pending`.
    #[must_use]
    pub fn initial_state(&self) -> SessionState {
        if self
            .origin_fingerprint
            .as_deref()
            .is_some_and(|fp| !fp.is_empty())
        {
            SessionState::Init
        } else {
            SessionState::Pending
        }
    }
}

/// Columns written by a transition. Every field is fill-once (a value already
/// stored is never overwritten) except `role`, which the transition to
/// `verified` replaces with the role the SSO token was minted for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub origin_fingerprint: Option<String>,
    pub approval_fingerprint: Option<String>,
    pub external_user_id: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub identity_id: Option<Uuid>,
    pub role: Option<String>,
    pub success_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_forward_path() {
        assert_eq!(SessionState::Init.rank(), SessionState::Pending.rank());
        assert!(SessionState::Pending.rank() < SessionState::Loaded.rank());
        assert!(SessionState::Loaded.rank() < SessionState::Scanned.rank());
        assert!(SessionState::Scanned.rank() < SessionState::Verified.rank());
        assert!(SessionState::Verified.is_terminal());
    }

    #[test]
    fn initial_state_depends_on_fingerprint() {
        let mut new = NewSession {
            token: "t".to_string(),
            ..NewSession::default()
        };
        assert_eq!(new.initial_state(), SessionState::Pending);
        new.origin_fingerprint = Some(String::new());
        assert_eq!(new.initial_state(), SessionState::Pending);
        new.origin_fingerprint = Some("fp1".to_string());
        assert_eq!(new.initial_state(), SessionState::Init);
    }

    #[test]
    fn state_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&SessionState::Scanned)?, "\"scanned\"");
        assert_eq!(SessionState::from_db("loaded").ok(), Some(SessionState::Loaded));
        assert!(SessionState::from_db("failed").is_err());
        Ok(())
    }
}
