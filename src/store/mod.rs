//! Storage backends. Both implement every store trait the engine consumes.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{PgStore, CHANGE_CHANNEL};
