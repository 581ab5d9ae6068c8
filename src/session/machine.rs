//! Guarded state transitions.
//!
//! Every transition is a single conditional update; when it matches nothing the
//! row is re-read only to tell `NotFound` from `InvalidState` (or, for the
//! idempotent transitions, to report the no-op).

use tracing::{debug, info};

use super::models::{NewSession, Session, SessionPatch, SessionState};
use super::repo::SessionStore;
use crate::error::{EngineError, Result};

use SessionState::{Init, Loaded, Pending, Scanned, Verified};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Widget displayed on the original device.
    Load,
    /// Pairing URL opened on the second device.
    Scan,
    /// Explicit approval from the second device.
    Approve,
    /// Direct verification (OTP, magic link, credentials, social).
    Complete,
}

impl Transition {
    #[must_use]
    pub fn sources(self) -> &'static [SessionState] {
        match self {
            Self::Load => &[Init, Pending],
            Self::Scan => &[Init, Loaded],
            Self::Approve => &[Scanned],
            Self::Complete => &[Init, Pending, Loaded, Scanned],
        }
    }

    #[must_use]
    pub fn target(self) -> SessionState {
        match self {
            Self::Load => Loaded,
            Self::Scan => Scanned,
            Self::Approve | Self::Complete => Verified,
        }
    }

    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Scan => "scan",
            Self::Approve => "approve",
            Self::Complete => "verify",
        }
    }
}

/// Insert a fresh session in `init` or `pending`.
///
/// # Errors
/// `Store` on I/O failure.
pub async fn create(store: &dyn SessionStore, new: NewSession) -> Result<Session> {
    let session = store.insert(new).await?;
    info!(state = %session.state, embed_id = ?session.embed_id, "Session created");
    Ok(session)
}

/// Read a session or fail with `NotFound`.
///
/// # Errors
/// `NotFound` when no row exists, `Store` on I/O failure.
pub async fn current(store: &dyn SessionStore, token: &str) -> Result<Session> {
    store
        .select_by_token(token)
        .await?
        .ok_or(EngineError::NotFound("session"))
}

/// Apply a transition. Zero matched rows become `NotFound` or `InvalidState`.
///
/// # Errors
/// `NotFound`, `InvalidState` or `Store`.
pub async fn apply(
    store: &dyn SessionStore,
    token: &str,
    transition: Transition,
    patch: &SessionPatch,
) -> Result<Session> {
    if let Some(session) = store
        .update(token, transition.target(), patch, transition.sources())
        .await?
    {
        debug!(state = %session.state, action = transition.action(), "Session transitioned");
        return Ok(session);
    }
    let session = current(store, token).await?;
    Err(EngineError::InvalidState {
        action: transition.action(),
        current: session.state,
    })
}

/// `init|pending -> loaded`, filling in whatever the widget reported
/// (fingerprint, load-time role, supplied identity). A session that has
/// already moved past `loaded` is returned unchanged.
///
/// # Errors
/// `NotFound` or `Store`.
pub async fn load(store: &dyn SessionStore, token: &str, patch: &SessionPatch) -> Result<Session> {
    match apply(store, token, Transition::Load, patch).await {
        Err(EngineError::InvalidState { .. }) => current(store, token).await,
        other => other,
    }
}

/// `init|loaded -> scanned`. Already `scanned` or `verified` is a no-op.
///
/// # Errors
/// `NotFound`, `InvalidState` (from `pending`), or `Store`.
pub async fn scan(store: &dyn SessionStore, token: &str) -> Result<Session> {
    match apply(store, token, Transition::Scan, &SessionPatch::default()).await {
        Err(EngineError::InvalidState { current: state, .. })
            if state.rank() >= Scanned.rank() =>
        {
            debug!(%state, "Scan on an already scanned session");
            current(store, token).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use anyhow::Result;

    const ALL: [Transition; 4] = [
        Transition::Load,
        Transition::Scan,
        Transition::Approve,
        Transition::Complete,
    ];

    #[test]
    fn transitions_only_move_forward() {
        for transition in ALL {
            for source in transition.sources() {
                assert!(
                    source.rank() < transition.target().rank(),
                    "{transition:?} from {source} does not advance"
                );
                assert_ne!(*source, transition.target());
            }
        }
    }

    #[test]
    fn verified_is_never_a_source() {
        for transition in ALL {
            assert!(!transition.sources().contains(&Verified));
        }
    }

    async fn new_session(store: &InMemoryStore, fingerprint: Option<&str>) -> Result<Session> {
        Ok(create(
            store,
            NewSession {
                token: format!("tok-{}", uuid::Uuid::new_v4()),
                origin_fingerprint: fingerprint.map(str::to_string),
                ..NewSession::default()
            },
        )
        .await?)
    }

    #[tokio::test]
    async fn load_is_a_noop_once_advanced() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, Some("fp1")).await?;
        let scanned = scan(&store, &session.token).await?;
        assert_eq!(scanned.state, Scanned);

        let after = load(&store, &session.token, &SessionPatch::default()).await?;
        assert_eq!(after.state, Scanned);
        assert!(after.loaded_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn scan_is_idempotent() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, Some("fp1")).await?;
        let first = scan(&store, &session.token).await?;
        let second = scan(&store, &session.token).await?;
        assert_eq!(first.state, Scanned);
        assert_eq!(second.scanned_at, first.scanned_at);
        Ok(())
    }

    #[tokio::test]
    async fn scan_from_pending_is_rejected() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, None).await?;
        assert_eq!(session.state, Pending);
        let result = scan(&store, &session.token).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidState { current: Pending, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn load_fills_fingerprint_once() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, None).await?;
        let patch = SessionPatch {
            origin_fingerprint: Some("fp1".to_string()),
            ..SessionPatch::default()
        };
        let loaded = load(&store, &session.token, &patch).await?;
        assert_eq!(loaded.state, Loaded);
        assert_eq!(loaded.origin_fingerprint.as_deref(), Some("fp1"));
        assert!(loaded.loaded_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn verified_replaces_role_but_keeps_other_fields() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, Some("fp1")).await?;
        let load_patch = SessionPatch {
            origin_fingerprint: Some("fp-other".to_string()),
            role: Some("editor".to_string()),
            ..SessionPatch::default()
        };
        load(&store, &session.token, &load_patch).await?;

        let verify_patch = SessionPatch {
            role: Some("admin".to_string()),
            success_url: Some("/admin".to_string()),
            ..SessionPatch::default()
        };
        let verified = apply(&store, &session.token, Transition::Complete, &verify_patch).await?;
        assert_eq!(verified.role.as_deref(), Some("admin"));
        assert_eq!(verified.origin_fingerprint.as_deref(), Some("fp1"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            scan(&store, "missing").await,
            Err(EngineError::NotFound("session"))
        ));
        assert!(matches!(
            apply(&store, "missing", Transition::Approve, &SessionPatch::default()).await,
            Err(EngineError::NotFound("session"))
        ));
    }

    #[tokio::test]
    async fn approve_requires_scanned() -> Result<()> {
        let store = InMemoryStore::new();
        let session = new_session(&store, Some("fp1")).await?;
        let result = apply(
            &store,
            &session.token,
            Transition::Approve,
            &SessionPatch::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidState { current: Init, .. })
        ));
        Ok(())
    }
}
