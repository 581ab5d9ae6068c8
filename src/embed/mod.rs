//! Embed registry: resolves a public template token to a widget configuration.

mod models;
mod repo;

pub use models::{
    ActivePath, AuthMethod, AuthMethods, ComponentKind, Destinations, EmbedConfig, RoutingRule,
};
pub use repo::{EmbedRegistry, EmbedStore};
