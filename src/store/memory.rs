//! In-memory storage for tests and demo mode.
//!
//! Session writes take one mutex for the check-and-set, which gives the same
//! all-or-nothing guarded update the Postgres store gets from a single
//! conditional `UPDATE`.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    access::{RoutePermission, RoutePermissionSource},
    embed::{EmbedConfig, EmbedStore},
    identity::{ExternalProfile, Identity, IdentityStore},
    session::{
        FeedHub, FeedSubscription, NewSession, Session, SessionPatch, SessionState, SessionStore,
    },
};

#[derive(Default)]
pub struct InMemoryStore {
    embeds: RwLock<HashMap<Uuid, EmbedConfig>>,
    sessions: Mutex<HashMap<String, Session>>,
    identities: RwLock<HashMap<Uuid, Identity>>,
    permissions: RwLock<Vec<RoutePermission>>,
    feed: FeedHub,
}

fn fill<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
    if slot.is_none() {
        *slot = value.cloned();
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    pub fn insert_embed(&self, embed: EmbedConfig) {
        self.embeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(embed.id, embed);
    }

    pub fn insert_identity(&self, identity: Identity) {
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.id, identity);
    }

    pub fn set_route_permissions(&self, rules: Vec<RoutePermission>) {
        *self.permissions.write().unwrap_or_else(PoisonError::into_inner) = rules;
    }
}

#[async_trait]
impl EmbedStore for InMemoryStore {
    async fn select_by_template_token(&self, token: &str) -> anyhow::Result<Option<EmbedConfig>> {
        Ok(self
            .embeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|embed| embed.template_token == token)
            .cloned())
    }

    async fn select_by_id(&self, id: Uuid) -> anyhow::Result<Option<EmbedConfig>> {
        Ok(self
            .embeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn insert(&self, new: NewSession) -> anyhow::Result<Session> {
        let session = Session {
            state: new.initial_state(),
            token: new.token,
            embed_id: new.embed_id,
            origin_fingerprint: new.origin_fingerprint.filter(|fp| !fp.is_empty()),
            approval_fingerprint: None,
            external_user_id: new.external_user_id,
            user_email: new.user_email,
            user_name: new.user_name,
            identity_id: None,
            role: new.role,
            client_origin: new.client_origin,
            success_url: None,
            created_at: Utc::now(),
            loaded_at: None,
            scanned_at: None,
            verified_at: None,
        };
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&session.token) {
            anyhow::bail!("duplicate session token");
        }
        sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn select_by_token(&self, token: &str) -> anyhow::Result<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned())
    }

    async fn update(
        &self,
        token: &str,
        target: SessionState,
        patch: &SessionPatch,
        where_state_in: &[SessionState],
    ) -> anyhow::Result<Option<Session>> {
        let updated = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(session) = sessions.get_mut(token) else {
                return Ok(None);
            };
            if !where_state_in.contains(&session.state) {
                return Ok(None);
            }

            let now = Utc::now();
            session.state = target;
            match target {
                SessionState::Loaded => fill(&mut session.loaded_at, Some(&now)),
                SessionState::Scanned => fill(&mut session.scanned_at, Some(&now)),
                SessionState::Verified => {
                    fill(&mut session.verified_at, Some(&now));
                    fill(&mut session.success_url, patch.success_url.as_ref());
                    if let Some(role) = patch.role.as_ref() {
                        session.role = Some(role.clone());
                    }
                }
                SessionState::Init | SessionState::Pending => {}
            }
            fill(&mut session.origin_fingerprint, patch.origin_fingerprint.as_ref());
            fill(&mut session.approval_fingerprint, patch.approval_fingerprint.as_ref());
            fill(&mut session.external_user_id, patch.external_user_id.as_ref());
            fill(&mut session.user_email, patch.user_email.as_ref());
            fill(&mut session.user_name, patch.user_name.as_ref());
            fill(&mut session.identity_id, patch.identity_id.as_ref());
            fill(&mut session.role, patch.role.as_ref());
            session.clone()
        };
        self.feed.publish(&updated);
        Ok(Some(updated))
    }

    fn watch(&self, token: &str) -> FeedSubscription {
        self.feed.subscribe(token)
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_by_external_id(&self, external_id: &str) -> anyhow::Result<Option<Identity>> {
        Ok(self
            .identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|identity| identity.external_id == external_id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Identity>> {
        Ok(self
            .identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|identity| {
                identity
                    .email
                    .as_deref()
                    .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn provision(&self, profile: &ExternalProfile) -> anyhow::Result<Identity> {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = identities
            .values()
            .find(|identity| identity.external_id == profile.external_id)
        {
            return Ok(existing.clone());
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            external_id: profile.external_id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            password_hash: None,
            role: None,
            created_at: Utc::now(),
        };
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl RoutePermissionSource for InMemoryStore {
    async fn load_route_permissions(&self) -> anyhow::Result<Vec<RoutePermission>> {
        Ok(self
            .permissions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
