//! Per-token fan-out of session row changes.
//!
//! Stores publish every row they write; subscribers get their own receiver on a
//! per-token `broadcast` channel. The channel is dropped from the map as soon as
//! its last subscriber goes away.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::models::Session;

const CHANNEL_CAPACITY: usize = 16;

type Senders = Arc<Mutex<HashMap<String, broadcast::Sender<Session>>>>;

#[derive(Clone, Default)]
pub struct FeedHub {
    senders: Senders,
}

fn lock(senders: &Senders) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Session>>> {
    // A panicking holder cannot leave the map half-written.
    senders.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FeedHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subscribe(&self, token: &str) -> FeedSubscription {
        let receiver = lock(&self.senders)
            .entry(token.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        FeedSubscription {
            token: token.to_string(),
            receiver: Some(receiver),
            senders: self.senders.clone(),
        }
    }

    /// Deliver a row to current subscribers of its token. Rows nobody watches are dropped.
    pub fn publish(&self, session: &Session) {
        let senders = lock(&self.senders);
        if let Some(sender) = senders.get(&session.token) {
            // Err only means every receiver is already gone.
            let _ = sender.send(session.clone());
        }
    }

    #[must_use]
    pub fn is_watched(&self, token: &str) -> bool {
        lock(&self.senders).contains_key(token)
    }

    /// Close every channel; subscribers see the end of their feed.
    pub fn close_all(&self) {
        let dropped = {
            let mut senders = lock(&self.senders);
            let count = senders.len();
            senders.clear();
            count
        };
        if dropped > 0 {
            warn!(channels = dropped, "Closed all session feeds");
        }
    }
}

/// One subscriber's view of a token's changes.
pub struct FeedSubscription {
    token: String,
    receiver: Option<broadcast::Receiver<Session>>,
    senders: Senders,
}

impl FeedSubscription {
    /// Next published row, or `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<Session> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(session) => return Some(session),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(token = %self.token, skipped, "Session feed lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        // Release our receiver first so the count below excludes it.
        drop(self.receiver.take());
        let mut senders = lock(&self.senders);
        if senders
            .get(&self.token)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            senders.remove(&self.token);
            debug!(token = %self.token, "Released session feed");
        }
    }
}
