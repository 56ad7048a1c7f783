//! Control-plane subsystem.
//!
//! # Data Flow
//! ```text
//! control plane API
//!     → client.rs (REST calls)
//!     → types.rs (APIs, plans, subscriptions, webhook events)
//!     → sync orchestrator (desired state) / event processor (events)
//! ```

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::http::client::ClientError;

pub use client::ControlPlaneClient;
pub use types::{
    ApiConfig, ApiDefinition, ApiSummary, ApplicationSummary, EventEntity, EventKind, Plan,
    PluginConfig, RotatedKey, RouteDefinition, ServiceDefinition, Subscription, WebhookEvent,
    WebhookListener,
};

/// Operations the engine needs from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn ping(&self) -> Result<(), ClientError>;

    async fn list_apis(&self) -> Result<Vec<ApiSummary>, ClientError>;
    async fn get_api_config(&self, api_id: &str) -> Result<ApiConfig, ClientError>;
    async fn list_plans(&self) -> Result<Vec<Plan>, ClientError>;
    async fn list_applications(&self) -> Result<Vec<ApplicationSummary>, ClientError>;
    async fn list_app_subscriptions(&self, app_id: &str) -> Result<Vec<Subscription>, ClientError>;

    /// Names of plugins and consumers this adapter must leave alone.
    async fn get_ignore_list(&self) -> Result<Vec<String>, ClientError>;

    /// Pending events for `listener`, oldest first.
    async fn get_webhook_events(&self, listener: &str) -> Result<Vec<WebhookEvent>, ClientError>;
    /// Acknowledge one event by removing it from the queue.
    async fn delete_webhook_event(&self, listener: &str, event_id: &str) -> Result<(), ClientError>;
    /// Drop every pending event for `listener`.
    async fn flush_webhook_events(&self, listener: &str) -> Result<(), ClientError>;
    async fn upsert_webhook_listener(&self, listener: &WebhookListener) -> Result<(), ClientError>;

    async fn notify_rotated_key(&self, key: &RotatedKey) -> Result<(), ClientError>;
}
