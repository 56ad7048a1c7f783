//! Reconciliation engine.
//!
//! # Data Flow
//! ```text
//! trigger (init, resync, webhook event, file change)
//!     → orchestrator.rs (fetch desired + actual concurrently)
//!     → todo.rs (pure diff into add / update / delete)
//!     → apply.rs (bounded fan-out against the gateway)
//! ```
//!
//! # Design Decisions
//! - Stateless: todo lists are rebuilt every pass, convergence comes from re-running
//! - Fixed stage order per entity kind; the first failing stage ends the pass
//! - No rollback of already applied items

pub mod apply;
pub mod cache;
pub mod desired;
pub mod matching;
pub mod naming;
pub mod orchestrator;
pub mod todo;

use std::fmt;

use thiserror::Error;

use crate::http::client::ClientError;
use crate::keys::CredentialError;

pub use cache::ApiCache;
pub use desired::ConsumerDefinition;
pub use matching::IgnoreList;
pub use naming::username;
pub use orchestrator::SyncOrchestrator;
pub use todo::TodoList;

/// Gateway entity kinds the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Api,
    Route,
    Plugin,
    Consumer,
    ConsumerPlugin,
    Credential,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Route => "route",
            Self::Plugin => "plugin",
            Self::Consumer => "consumer",
            Self::ConsumerPlugin => "consumer_plugin",
            Self::Credential => "credential",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to the trigger source of a pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Desired or actual state could not be read; nothing was applied.
    #[error("failed to fetch {what}: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: ClientError,
    },

    /// A gateway mutation failed; remaining stages of this kind were skipped.
    #[error("failed to apply {kind} change: {source}")]
    Apply {
        kind: EntityKind,
        #[source]
        source: ClientError,
    },

    /// A webhook event could not be handled and stays queued.
    #[error("event {event_id} failed: {source}")]
    Dispatch {
        event_id: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("gateway state conflict: {0}")]
    Conflict(String),

    #[error("webhook listener registration failed: {0}")]
    Listener(#[source] ClientError),
}

impl SyncError {
    pub fn fetch(what: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| Self::Fetch { what, source }
    }

    pub fn apply(kind: EntityKind) -> impl FnOnce(ClientError) -> Self {
        move |source| Self::Apply { kind, source }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
