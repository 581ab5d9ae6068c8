use async_trait::async_trait;

use super::models::{ExternalProfile, Identity};

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> anyhow::Result<Option<Identity>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Identity>>;

    /// Return the identity keyed by `profile.external_id`, creating it on first
    /// sight. Existing rows keep their stored email and name.
    async fn provision(&self, profile: &ExternalProfile) -> anyhow::Result<Identity>;
}
