//! Gateway-side entity representations (actual state).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to another gateway entity by id (`{"id": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

/// A gateway service. Its `name` equals the desired API id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayService {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A route attached to a service. Unnamed routes cannot be correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRoute {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A plugin instance; scope is given by which refs are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPlugin {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub route: Option<EntityRef>,
    #[serde(default)]
    pub service: Option<EntityRef>,
    #[serde(default)]
    pub consumer: Option<EntityRef>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl GatewayPlugin {
    /// Bound to a route rather than to the whole service.
    pub fn is_route_scoped(&self) -> bool {
        self.route.is_some()
    }

    /// Not bound to any service, route or consumer.
    pub fn is_global(&self) -> bool {
        self.route.is_none() && self.service.is_none() && self.consumer.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConsumer {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl GatewayConsumer {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_deref().unwrap_or_default().iter().any(|t| t == tag)
    }
}

/// A `key-auth` credential belonging to a consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCredential {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl KeyCredential {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_deref().unwrap_or_default().iter().any(|t| t == tag)
    }

    /// Tags with `tag` removed.
    pub fn tags_without(&self, tag: &str) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|t| *t != tag)
            .cloned()
            .collect()
    }
}

/// Where a new plugin is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginScope {
    Global,
    /// Service by id or name.
    Service(String),
    Route(String),
    /// Consumer-specific plugin on one service.
    ConsumerOnService { consumer_id: String, service: String },
}

/// The actual state of one managed API: its service plus service and route plugins.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayApi {
    pub service: GatewayService,
    pub plugins: Vec<GatewayPlugin>,
}

impl GatewayApi {
    pub fn name(&self) -> &str {
        &self.service.name
    }
}
