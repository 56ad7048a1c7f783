//! API key rotation.
//!
//! # Data Flow
//! ```text
//! key_rotation event   → rotation.rs issue  → new credential tagged rotate-key
//!                                           → control plane notified (detached)
//! revoke_old_key event → rotation.rs revoke → tag dropped from the new key
//!                                           → old credential deleted
//! ```
//!
//! # Design Decisions
//! - The new key is promoted before the old one is deleted, so a consumer
//!   always holds at least one valid key
//! - Consumers are resolved by their derived username; an absent consumer is
//!   an error and nothing is mutated

pub mod rotation;

use thiserror::Error;

use crate::http::client::ClientError;

pub use rotation::KeyRotationManager;

/// Tag carried by a freshly issued key until the old one is revoked.
pub const ROTATE_KEY_TAG: &str = "rotate-key";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no gateway consumer '{username}'")]
    ConsumerNotFound { username: String },

    #[error(transparent)]
    Gateway(#[from] ClientError),
}
