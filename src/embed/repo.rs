use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::models::EmbedConfig;
use crate::error::{EngineError, Result};

/// Read access to embed configuration rows.
#[async_trait]
pub trait EmbedStore: Send + Sync {
    async fn select_by_template_token(&self, token: &str) -> anyhow::Result<Option<EmbedConfig>>;

    async fn select_by_id(&self, id: Uuid) -> anyhow::Result<Option<EmbedConfig>>;
}

#[derive(Clone)]
pub struct EmbedRegistry {
    store: Arc<dyn EmbedStore>,
}

impl EmbedRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn EmbedStore>) -> Self {
        Self { store }
    }

    /// Resolve a public template token.
    ///
    /// # Errors
    /// `NotFound` for unknown tokens, `Inactive` for disabled embeds.
    pub async fn resolve(&self, template_token: &str) -> Result<EmbedConfig> {
        let embed = self
            .store
            .select_by_template_token(template_token)
            .await?
            .ok_or(EngineError::NotFound("embed"))?;
        if !embed.active {
            debug!(embed_id = %embed.id, "Rejecting inactive embed");
            return Err(EngineError::Inactive);
        }
        Ok(embed)
    }

    /// Resolve an embed an existing session points at.
    ///
    /// A session referencing a missing embed is a broken invariant, not a
    /// client error, so this reports `Configuration`.
    ///
    /// # Errors
    /// `Configuration` for dangling references, `Store` on I/O failure.
    pub async fn referenced(&self, id: Uuid) -> Result<EmbedConfig> {
        self.store
            .select_by_id(id)
            .await?
            .ok_or_else(|| EngineError::Configuration(format!("session references missing embed {id}")))
    }

    /// Like [`Self::resolve`], but also rejects components that cannot authenticate.
    ///
    /// # Errors
    /// `UnsupportedComponent` for non-auth kinds, plus everything `resolve` returns.
    pub async fn resolve_auth(&self, template_token: &str) -> Result<EmbedConfig> {
        let embed = self.resolve(template_token).await?;
        if !embed.component.is_auth() {
            return Err(EngineError::UnsupportedComponent(embed.component));
        }
        Ok(embed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embed::ComponentKind, store::InMemoryStore, verify::test_support::embed};

    fn registry_with(embeds: Vec<EmbedConfig>) -> EmbedRegistry {
        let store = Arc::new(InMemoryStore::new());
        for embed in embeds {
            store.insert_embed(embed);
        }
        EmbedRegistry::new(store)
    }

    #[tokio::test]
    async fn unknown_inactive_and_non_auth_embeds_are_distinguished() {
        let active = embed(None);
        let mut inactive = embed(None);
        inactive.active = false;
        let mut pricing = embed(None);
        pricing.component = ComponentKind::PricingCard;
        let registry = registry_with(vec![active.clone(), inactive.clone(), pricing.clone()]);

        assert!(registry.resolve(&active.template_token).await.is_ok());
        assert!(matches!(
            registry.resolve("missing").await,
            Err(EngineError::NotFound("embed"))
        ));
        assert!(matches!(
            registry.resolve_auth(&inactive.template_token).await,
            Err(EngineError::Inactive)
        ));
        assert!(registry.resolve(&pricing.template_token).await.is_ok());
        assert!(matches!(
            registry.resolve_auth(&pricing.template_token).await,
            Err(EngineError::UnsupportedComponent(ComponentKind::PricingCard))
        ));
    }

    #[tokio::test]
    async fn dangling_reference_is_a_configuration_error() {
        let registry = registry_with(Vec::new());
        assert!(matches!(
            registry.referenced(Uuid::new_v4()).await,
            Err(EngineError::Configuration(_))
        ));
    }
}
