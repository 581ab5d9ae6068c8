//! Real-time state notifications for the original page.

use std::{sync::Arc, time::Duration};

use futures::{
    future,
    stream::{self, BoxStream, StreamExt},
};
use serde::{Deserialize, Serialize};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error};
use utoipa::ToSchema;

use super::{
    feed::FeedSubscription,
    machine,
    models::{Session, SessionState},
    repo::SessionStore,
};
use crate::{error::Result, issuer::Issuer};

/// Payload of a `state` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    State(StateEvent),
    KeepAlive,
}

#[derive(Clone)]
pub struct Notifier {
    sessions: Arc<dyn SessionStore>,
    issuer: Arc<Issuer>,
    heartbeat: Duration,
}

struct Watch {
    feed: FeedSubscription,
    heartbeat: Interval,
    issuer: Arc<Issuer>,
    last_rank: u8,
    finished: bool,
}

impl Notifier {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, issuer: Arc<Issuer>, heartbeat: Duration) -> Self {
        Self {
            sessions,
            issuer,
            heartbeat,
        }
    }

    /// Direct read of the current state, for clients that poll.
    ///
    /// # Errors
    /// `NotFound`, or whatever the issuer reports for a verified session.
    pub async fn current(&self, token: &str) -> Result<StateEvent> {
        let session = machine::current(self.sessions.as_ref(), token).await?;
        event_for(&self.issuer, &session).await
    }

    /// Stream the current state, then every forward change, with keepalives.
    ///
    /// The feed is subscribed before the row is read so nothing written in
    /// between is lost. Dropping the stream releases the subscription.
    ///
    /// # Errors
    /// `NotFound` when the session does not exist.
    pub async fn subscribe(&self, token: &str) -> Result<BoxStream<'static, Notice>> {
        let feed = self.sessions.watch(token);
        let session = machine::current(self.sessions.as_ref(), token).await?;
        let initial = event_for(&self.issuer, &session).await?;

        let first = stream::once(future::ready(Notice::State(initial)));
        if session.state.is_terminal() {
            return Ok(first.boxed());
        }

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watch = Watch {
            feed,
            heartbeat,
            issuer: self.issuer.clone(),
            last_rank: session.state.rank(),
            finished: false,
        };
        Ok(first.chain(stream::unfold(watch, next_notice)).boxed())
    }
}

async fn event_for(issuer: &Issuer, session: &Session) -> Result<StateEvent> {
    let success_url = if session.state.is_terminal() {
        issuer.redirect_for(session).await?
    } else {
        None
    };
    Ok(StateEvent {
        state: session.state,
        success_url,
    })
}

async fn next_notice(mut watch: Watch) -> Option<(Notice, Watch)> {
    if watch.finished {
        return None;
    }
    loop {
        tokio::select! {
            _ = watch.heartbeat.tick() => return Some((Notice::KeepAlive, watch)),
            next = watch.feed.recv() => {
                // Closed feed: end quietly and let the client reconnect or poll.
                let session = next?;
                if session.state.rank() <= watch.last_rank {
                    debug!(state = %session.state, "Dropping stale session event");
                    continue;
                }
                watch.last_rank = session.state.rank();
                watch.finished = session.state.is_terminal();
                return match event_for(&watch.issuer, &session).await {
                    Ok(event) => Some((Notice::State(event), watch)),
                    Err(err) => {
                        error!("Failed to build verified event: {err}");
                        None
                    }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        embed::EmbedRegistry,
        issuer::IssuerSettings,
        session::{NewSession, SessionPatch, Transition},
        store::InMemoryStore,
    };
    use anyhow::{Context, Result};

    fn notifier(store: &Arc<InMemoryStore>, heartbeat: Duration) -> Notifier {
        let issuer = Issuer::new(
            EmbedRegistry::new(store.clone()),
            IssuerSettings::default(),
        );
        Notifier::new(store.clone(), Arc::new(issuer), heartbeat)
    }

    async fn new_session(store: &InMemoryStore) -> Result<Session> {
        Ok(machine::create(
            store,
            NewSession {
                token: "tok".to_string(),
                origin_fingerprint: Some("fp1".to_string()),
                client_origin: Some("https://shop.example.com".to_string()),
                ..NewSession::default()
            },
        )
        .await?)
    }

    #[tokio::test]
    async fn initial_event_comes_first() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let mut events = notifier(&store, Duration::from_secs(15)).subscribe("tok").await?;
        let first = events.next().await.context("stream ended")?;
        assert_eq!(
            first,
            Notice::State(StateEvent {
                state: SessionState::Init,
                success_url: None,
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn verified_session_yields_one_event_then_ends() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let patch = SessionPatch {
            success_url: Some("https://shop.example.com/dashboard".to_string()),
            ..SessionPatch::default()
        };
        machine::apply(store.as_ref(), "tok", Transition::Complete, &patch).await?;

        let events: Vec<Notice> = notifier(&store, Duration::from_secs(15))
            .subscribe("tok")
            .await?
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        let Some(Notice::State(event)) = events.first() else {
            anyhow::bail!("expected a state event");
        };
        assert_eq!(event.state, SessionState::Verified);
        assert!(event.success_url.as_deref().is_some_and(|url| !url.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn forward_changes_stream_until_verified() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let mut events = notifier(&store, Duration::from_secs(15)).subscribe("tok").await?;
        events.next().await.context("missing initial event")?;

        machine::scan(store.as_ref(), "tok").await?;
        let scanned = events.next().await.context("missing scanned event")?;
        assert!(matches!(scanned, Notice::State(StateEvent { state: SessionState::Scanned, .. })));

        let patch = SessionPatch {
            success_url: Some("/dashboard".to_string()),
            ..SessionPatch::default()
        };
        machine::apply(store.as_ref(), "tok", Transition::Approve, &patch).await?;
        let verified = events.next().await.context("missing verified event")?;
        let Notice::State(event) = verified else {
            anyhow::bail!("expected a state event");
        };
        assert_eq!(event.state, SessionState::Verified);
        assert_eq!(event.success_url.as_deref(), Some("/dashboard"));
        assert!(events.next().await.is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn keepalives_arrive_on_the_heartbeat() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let mut events = notifier(&store, Duration::from_secs(15)).subscribe("tok").await?;
        events.next().await.context("missing initial event")?;
        assert_eq!(events.next().await, Some(Notice::KeepAlive));
        Ok(())
    }

    #[tokio::test]
    async fn closed_feed_ends_stream() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let mut events = notifier(&store, Duration::from_secs(15)).subscribe("tok").await?;
        events.next().await.context("missing initial event")?;
        store.feed().close_all();
        assert!(events.next().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dropping_stream_releases_feed() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        new_session(&store).await?;
        let events = notifier(&store, Duration::from_secs(15)).subscribe("tok").await?;
        assert!(store.feed().is_watched("tok"));
        drop(events);
        assert!(!store.feed().is_watched("tok"));
        Ok(())
    }

    #[tokio::test]
    async fn subscribe_to_unknown_session_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let result = notifier(&store, Duration::from_secs(15)).subscribe("nope").await;
        assert!(matches!(
            result,
            Err(crate::error::EngineError::NotFound("session"))
        ));
    }
}
