//! Gateway admin subsystem.
//!
//! # Data Flow
//! ```text
//! sync orchestrator / key rotation
//!     → GatewayAdmin (trait seam)
//!     → client.rs (REST calls against the admin API)
//!     → types.rs (services, routes, plugins, consumers, credentials)
//! ```
//!
//! # Design Decisions
//! - Every call is a single request; no retries (the next pass converges)
//! - Bodies are passed as JSON values; only identity fields are typed

pub mod client;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::http::client::ClientError;

pub use client::GatewayClient;
pub use types::{
    EntityRef, GatewayApi, GatewayConsumer, GatewayPlugin, GatewayRoute, GatewayService,
    KeyCredential, PluginScope,
};

/// Operations the engine needs from the gateway admin surface.
#[async_trait]
pub trait GatewayAdmin: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), ClientError>;

    async fn list_services(&self) -> Result<Vec<GatewayService>, ClientError>;
    async fn add_service(&self, body: &Value) -> Result<GatewayService, ClientError>;
    async fn update_service(&self, id: &str, body: &Value) -> Result<GatewayService, ClientError>;
    async fn delete_service(&self, id: &str) -> Result<(), ClientError>;

    /// Routes of a service, addressed by service name or id.
    async fn list_routes(&self, service: &str) -> Result<Vec<GatewayRoute>, ClientError>;
    async fn add_route(&self, service: &str, body: &Value) -> Result<GatewayRoute, ClientError>;
    async fn update_route(&self, id: &str, body: &Value) -> Result<GatewayRoute, ClientError>;
    async fn delete_route(&self, id: &str) -> Result<(), ClientError>;

    /// Service- and route-level plugins of a service (no consumer plugins).
    async fn list_service_plugins(&self, service_id: &str) -> Result<Vec<GatewayPlugin>, ClientError>;
    async fn list_plugins_by_name(&self, name: &str) -> Result<Vec<GatewayPlugin>, ClientError>;
    async fn add_plugin(&self, scope: &PluginScope, body: &Value) -> Result<GatewayPlugin, ClientError>;
    async fn update_plugin(&self, id: &str, body: &Value) -> Result<GatewayPlugin, ClientError>;
    async fn delete_plugin(&self, id: &str) -> Result<(), ClientError>;

    async fn list_consumers(&self) -> Result<Vec<GatewayConsumer>, ClientError>;
    async fn get_consumer(&self, username: &str) -> Result<Option<GatewayConsumer>, ClientError>;
    async fn add_consumer(&self, body: &Value) -> Result<GatewayConsumer, ClientError>;
    async fn update_consumer(&self, id: &str, body: &Value) -> Result<GatewayConsumer, ClientError>;
    async fn delete_consumer(&self, username_or_id: &str) -> Result<(), ClientError>;
    async fn list_consumer_plugins(&self, consumer_id: &str) -> Result<Vec<GatewayPlugin>, ClientError>;

    async fn list_key_credentials(&self, username: &str) -> Result<Vec<KeyCredential>, ClientError>;
    /// Create a key credential; the gateway generates the key when `key` is `None`.
    async fn add_key_credential(
        &self,
        username: &str,
        key: Option<&str>,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError>;
    async fn update_key_credential_tags(
        &self,
        username: &str,
        id: &str,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError>;
    async fn delete_key_credential(&self, username: &str, id_or_key: &str) -> Result<(), ClientError>;
}
