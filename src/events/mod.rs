//! Webhook event processing.
//!
//! # Data Flow
//! ```text
//! POST / (notification)
//!     → processor.rs (fetch pending events, serial dispatch)
//!     → EventAction (closed set of things an event can cause)
//!     → sync orchestrator / key rotation
//!     → acknowledge (delete from the control plane queue)
//!     → hooks.rs (best-effort subscription hooks)
//! ```
//!
//! # Design Decisions
//! - One event at a time, in arrival order; a failure stops the batch
//! - An event is acknowledged only after its action succeeded
//! - Unknown or malformed events are acknowledged without action

pub mod hooks;
pub mod processor;

use serde::Deserialize;

use crate::control_plane::{EventEntity, EventKind, WebhookEvent};

pub use hooks::{ForwardingHook, HookRegistry, SubscriptionHook};
pub use processor::EventProcessor;

/// What a webhook event asks the adapter to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    SyncApplication { app_id: String },
    /// Remove the consumers of the subscriptions the deleted application had.
    DeleteApplication { app_id: String, api_ids: Vec<String> },
    SyncSubscription { app_id: String, api_id: String },
    DeleteSubscription { app_id: String, api_id: String },
    RotateKey { app_id: String, api_id: String },
    RevokeKey { app_id: String, api_id: String, old_key: String },
    Discard { reason: &'static str },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventData {
    application_id: Option<String>,
    api_id: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    subscriptions: Vec<SubscriptionRef>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRef {
    api: String,
}

impl EventAction {
    pub fn from_event(event: &WebhookEvent) -> Self {
        if event.entity == EventEntity::Import {
            return Self::Discard { reason: "import" };
        }

        let data = match EventData::deserialize(&event.data) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(event = %event.id, %error, "Malformed event data");
                return Self::Discard { reason: "malformed data" };
            }
        };
        let Some(app_id) = data.application_id else {
            return Self::Discard { reason: "missing applicationId" };
        };

        match (event.entity, event.action) {
            (EventEntity::Application, EventKind::Add | EventKind::Update) => {
                Self::SyncApplication { app_id }
            }
            (EventEntity::Application, EventKind::Delete) => Self::DeleteApplication {
                app_id,
                api_ids: data.subscriptions.into_iter().map(|s| s.api).collect(),
            },
            (EventEntity::Subscription, action) => {
                let Some(api_id) = data.api_id else {
                    return Self::Discard { reason: "missing apiId" };
                };
                match action {
                    EventKind::Add | EventKind::Update => Self::SyncSubscription { app_id, api_id },
                    EventKind::Delete => Self::DeleteSubscription { app_id, api_id },
                    EventKind::KeyRotation => Self::RotateKey { app_id, api_id },
                    EventKind::RevokeOldKey => match data.api_key {
                        Some(old_key) => Self::RevokeKey {
                            app_id,
                            api_id,
                            old_key,
                        },
                        None => Self::Discard { reason: "missing apiKey" },
                    },
                    EventKind::Other => Self::Discard { reason: "unknown action" },
                }
            }
            _ => Self::Discard { reason: "unhandled event" },
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SyncApplication { .. } => "sync_application",
            Self::DeleteApplication { .. } => "delete_application",
            Self::SyncSubscription { .. } => "sync_subscription",
            Self::DeleteSubscription { .. } => "delete_subscription",
            Self::RotateKey { .. } => "key_rotation",
            Self::RevokeKey { .. } => "revoke_old_key",
            Self::Discard { .. } => "discard",
        }
    }
}
