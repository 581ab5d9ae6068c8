use async_trait::async_trait;

use super::feed::FeedSubscription;
use super::models::{NewSession, Session, SessionPatch, SessionState};

/// Persistence for session rows.
///
/// `update` is the only way a session changes state: one conditional write
/// keyed by token and guarded by the allowed source states. Implementations
/// publish every written row to their change feed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, new: NewSession) -> anyhow::Result<Session>;

    async fn select_by_token(&self, token: &str) -> anyhow::Result<Option<Session>>;

    /// Move the session to `target` if its current state is in `where_state_in`,
    /// applying `patch` fill-once. Returns `None` when no row matched.
    async fn update(
        &self,
        token: &str,
        target: SessionState,
        patch: &SessionPatch,
        where_state_in: &[SessionState],
    ) -> anyhow::Result<Option<Session>>;

    /// Subscribe to future writes of one session.
    fn watch(&self, token: &str) -> FeedSubscription;

    /// Liveness check for `/health`.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
