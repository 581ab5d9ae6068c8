//! Role-based route gating for downstream apps.
//!
//! Rules map a path prefix to the roles allowed under it. The longest matching
//! prefix decides; a path no rule covers is open, and `admin` passes everywhere.
//! Rules are cached for a TTL measured on an injected [`Clock`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePermission {
    pub path_prefix: String,
    pub roles: Vec<String>,
}

impl RoutePermission {
    /// Segment-aware prefix match: `/admin` covers `/admin/users`, not `/administrator`.
    fn covers(&self, path: &str) -> bool {
        let prefix = self.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

#[async_trait]
pub trait RoutePermissionSource: Send + Sync {
    async fn load_route_permissions(&self) -> anyhow::Result<Vec<RoutePermission>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Decide whether `role` may open `path` under `rules`.
#[must_use]
pub fn is_allowed(rules: &[RoutePermission], path: &str, role: &str) -> bool {
    if role == ADMIN_ROLE {
        return true;
    }
    rules
        .iter()
        .filter(|rule| rule.covers(path))
        .max_by_key(|rule| rule.path_prefix.trim_end_matches('/').len())
        .map_or(true, |rule| rule.roles.iter().any(|allowed| allowed == role))
}

struct Cached {
    loaded_at: Instant,
    rules: Arc<Vec<RoutePermission>>,
}

pub struct RoutePermissionCache {
    source: Arc<dyn RoutePermissionSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
}

impl RoutePermissionCache {
    #[must_use]
    pub fn new(source: Arc<dyn RoutePermissionSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current rules, reloaded once the cached copy is older than the TTL.
    ///
    /// # Errors
    /// Returns an error if the source cannot be read.
    pub async fn rules(&self) -> anyhow::Result<Arc<Vec<RoutePermission>>> {
        let now = self.clock.now();
        if let Some(cached) = self.cached.read().await.as_ref() {
            if now.duration_since(cached.loaded_at) < self.ttl {
                return Ok(cached.rules.clone());
            }
        }

        let rules = Arc::new(self.source.load_route_permissions().await?);
        debug!(rules = rules.len(), "Loaded route permissions");
        *self.cached.write().await = Some(Cached {
            loaded_at: now,
            rules: rules.clone(),
        });
        Ok(rules)
    }

    /// Drop the cached rules; the next check reloads them.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    /// # Errors
    /// Returns an error if the rules cannot be loaded.
    pub async fn check(&self, path: &str, role: &str) -> anyhow::Result<bool> {
        Ok(is_allowed(&self.rules().await?, path, role))
    }
}
