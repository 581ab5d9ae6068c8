//! Sessions: the row, its forward-only state machine, and the change feed.

mod feed;
pub mod machine;
mod models;
mod notify;
mod repo;

pub use feed::{FeedHub, FeedSubscription};
pub use machine::Transition;
pub use models::{NewSession, Session, SessionPatch, SessionState};
pub use notify::{Notice, Notifier, StateEvent};
pub use repo::SessionStore;
