//! Postgres storage.
//!
//! Session changes reach subscribers through `LISTEN session_changes`: a
//! trigger (see `sql/schema.sql`) publishes the token of every updated row, and
//! one listener task re-reads watched rows into the shared [`FeedHub`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    Connection, PgPool, Row,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::{
    access::{RoutePermission, RoutePermissionSource},
    embed::{EmbedConfig, EmbedStore},
    identity::{ExternalProfile, Identity, IdentityStore},
    session::{
        FeedHub, FeedSubscription, NewSession, Session, SessionPatch, SessionState, SessionStore,
    },
};

pub const CHANGE_CHANNEL: &str = "session_changes";

const LISTENER_RETRY: Duration = Duration::from_secs(1);

const EMBED_COLUMNS: &str = r"
    e.id, e.template_token, e.component_type,
    e.method_qr, e.method_phone_otp, e.method_email_otp,
    e.method_password, e.method_google, e.method_github,
    e.success_url_a, e.success_url_b, e.active_path, e.routing_rule,
    e.signing_secret, r.name AS role_name, e.active
";

const SESSION_COLUMNS: &str = r"
    token, state, embed_id, origin_fingerprint, approval_fingerprint,
    external_user_id, user_email, user_name, identity_id, role,
    client_origin, success_url, created_at, loaded_at, scanned_at, verified_at
";

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    feed: FeedHub,
}

impl PgStore {
    /// Connect and start the change-feed listener.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        let store = Self::from_pool(pool);
        store.spawn_listener();
        Ok(store)
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            feed: FeedHub::new(),
        }
    }

    /// Fan `session_changes` notifications out to subscribers.
    ///
    /// A listener failure closes every open feed (streams end cleanly and
    /// clients fall back to reconnecting or polling) before retrying.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = store.listen().await {
                    error!("Session change listener failed: {err:#}");
                }
                store.feed.close_all();
                tokio::time::sleep(LISTENER_RETRY).await;
            }
        })
    }

    async fn listen(&self) -> Result<()> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .context("Failed to open listener connection")?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .context("Failed to LISTEN on session_changes")?;
        info!(channel = CHANGE_CHANNEL, "Listening for session changes");

        loop {
            let notification = listener
                .recv()
                .await
                .context("Failed to receive notification")?;
            let token = notification.payload();
            if !self.feed.is_watched(token) {
                continue;
            }
            match self.select_by_token(token).await? {
                Some(session) => self.feed.publish(&session),
                None => debug!("Notification for a session that no longer exists"),
            }
        }
    }
}

#[async_trait]
impl EmbedStore for PgStore {
    async fn select_by_template_token(&self, token: &str) -> Result<Option<EmbedConfig>> {
        let query = format!(
            "SELECT {EMBED_COLUMNS} FROM embeds e LEFT JOIN roles r ON r.id = e.role_id WHERE e.template_token = $1"
        );
        sqlx::query_as::<_, EmbedConfig>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup embed by template token")
    }

    async fn select_by_id(&self, id: Uuid) -> Result<Option<EmbedConfig>> {
        let query = format!(
            "SELECT {EMBED_COLUMNS} FROM embeds e LEFT JOIN roles r ON r.id = e.role_id WHERE e.id = $1"
        );
        sqlx::query_as::<_, EmbedConfig>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup embed by id")
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert(&self, new: NewSession) -> Result<Session> {
        let query = format!(
            r"
            INSERT INTO sessions
                (token, state, embed_id, origin_fingerprint,
                 external_user_id, user_email, user_name, role, client_origin)
            VALUES ($1, $2, $3, NULLIF($4, ''), $5, $6, $7, $8, $9)
            RETURNING {SESSION_COLUMNS}
            "
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(&new.token)
            .bind(new.initial_state().as_str())
            .bind(new.embed_id)
            .bind(&new.origin_fingerprint)
            .bind(&new.external_user_id)
            .bind(&new.user_email)
            .bind(&new.user_name)
            .bind(&new.role)
            .bind(&new.client_origin)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to insert session")
    }

    async fn select_by_token(&self, token: &str) -> Result<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup session")
    }

    async fn update(
        &self,
        token: &str,
        target: SessionState,
        patch: &SessionPatch,
        where_state_in: &[SessionState],
    ) -> Result<Option<Session>> {
        // One statement: the state predicate and every write succeed or fail together.
        let query = format!(
            r"
            UPDATE sessions SET
                state = $2::text,
                origin_fingerprint = COALESCE(origin_fingerprint, $3),
                approval_fingerprint = COALESCE(approval_fingerprint, $4),
                external_user_id = COALESCE(external_user_id, $5),
                user_email = COALESCE(user_email, $6),
                user_name = COALESCE(user_name, $7),
                identity_id = COALESCE(identity_id, $8),
                role = CASE WHEN $2::text = 'verified'
                    THEN COALESCE($9, role) ELSE COALESCE(role, $9) END,
                success_url = CASE WHEN $2::text = 'verified'
                    THEN COALESCE(success_url, $10) ELSE success_url END,
                loaded_at = CASE WHEN $2::text = 'loaded'
                    THEN COALESCE(loaded_at, NOW()) ELSE loaded_at END,
                scanned_at = CASE WHEN $2::text = 'scanned'
                    THEN COALESCE(scanned_at, NOW()) ELSE scanned_at END,
                verified_at = CASE WHEN $2::text = 'verified'
                    THEN COALESCE(verified_at, NOW()) ELSE verified_at END
            WHERE token = $1 AND state = ANY($11)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let sources: Vec<&str> = where_state_in.iter().map(|state| state.as_str()).collect();
        sqlx::query_as::<_, Session>(&query)
            .bind(token)
            .bind(target.as_str())
            .bind(&patch.origin_fingerprint)
            .bind(&patch.approval_fingerprint)
            .bind(&patch.external_user_id)
            .bind(&patch.user_email)
            .bind(&patch.user_name)
            .bind(patch.identity_id)
            .bind(&patch.role)
            .bind(&patch.success_url)
            .bind(&sources)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update session")
    }

    fn watch(&self, token: &str) -> FeedSubscription {
        self.feed.subscribe(token)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("Failed to acquire database connection")?;
        conn.ping()
            .instrument(info_span!("db.ping", db.system = "postgresql", db.operation = "PING"))
            .await
            .context("Failed to ping database")
    }
}

const IDENTITY_COLUMNS: &str = r"
    i.id, i.external_id, i.email, i.name, i.password_hash, r.name AS role_name, i.created_at
";

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Identity>> {
        let query = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities i LEFT JOIN roles r ON r.id = i.role_id WHERE i.external_id = $1"
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup identity by external id")
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let query = format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities i LEFT JOIN roles r ON r.id = i.role_id WHERE lower(i.email) = lower($1) ORDER BY i.created_at LIMIT 1"
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup identity by email")
    }

    async fn provision(&self, profile: &ExternalProfile) -> Result<Identity> {
        let query = format!(
            r"
            WITH i AS (
                INSERT INTO identities (external_id, email, name)
                VALUES ($1, $2, $3)
                ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
                RETURNING *
            )
            SELECT {IDENTITY_COLUMNS} FROM i LEFT JOIN roles r ON r.id = i.role_id
            "
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(&profile.external_id)
            .bind(&profile.email)
            .bind(&profile.name)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to provision identity")
    }
}

#[async_trait]
impl RoutePermissionSource for PgStore {
    async fn load_route_permissions(&self) -> Result<Vec<RoutePermission>> {
        let query = r"
            SELECT p.path_prefix, array_agg(r.name) AS roles
            FROM route_permissions p
            JOIN roles r ON r.id = p.role_id
            GROUP BY p.path_prefix
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to load route permissions")?;
        rows.into_iter()
            .map(|row| {
                Ok(RoutePermission {
                    path_prefix: row.try_get("path_prefix")?,
                    roles: row.try_get("roles")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .context("failed to decode route permissions")
    }
}
