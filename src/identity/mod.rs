//! End-user identities provisioned by the verifiers.

mod models;
pub mod password;
mod repo;

pub use models::{ExternalProfile, Identity};
pub use repo::IdentityStore;
