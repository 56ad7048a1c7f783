//! Control-plane wire types (desired state and webhook events).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// A plugin as declared by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PluginConfig {
    /// Full JSON representation (`name` plus declared fields).
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        Value::Object(map)
    }
}

/// A named route of an API, with its route-scoped plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub name: String,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RouteDefinition {
    /// Body sent to the gateway when creating or patching the route.
    pub fn body(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        Value::Object(map)
    }
}

/// Service-level part of an API definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Plugins are attached per route when set.
    #[serde(default)]
    pub enable_routes: Option<bool>,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServiceDefinition {
    pub fn route_scoped_plugins(&self) -> bool {
        self.enable_routes.unwrap_or(false)
    }

    /// Body sent to the gateway; the service name is the API id.
    pub fn body(&self, api_id: &str) -> Value {
        let mut map = self.fields.clone();
        map.insert("name".to_string(), Value::String(api_id.to_string()));
        Value::Object(map)
    }

    /// Body in the shape the gateway reports back, for comparison.
    ///
    /// The gateway stores `url` decomposed into protocol/host/port/path.
    pub fn comparable_body(&self, api_id: &str) -> Value {
        let mut body = self.body(api_id);
        let Some(map) = body.as_object_mut() else {
            return body;
        };
        let parsed = map
            .get("url")
            .and_then(Value::as_str)
            .and_then(|u| Url::parse(u).ok());
        if let Some(url) = parsed {
            map.remove("url");
            map.insert("protocol".to_string(), Value::from(url.scheme()));
            if let Some(host) = url.host_str() {
                map.insert("host".to_string(), Value::from(host));
            }
            if let Some(port) = url.port_or_known_default() {
                map.insert("port".to_string(), Value::from(port));
            }
            if url.path() != "/" {
                map.insert("path".to_string(), Value::from(url.path()));
            }
        }
        body
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api: ServiceDefinition,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// A desired API: the control plane's id plus its gateway configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiDefinition {
    pub id: String,
    pub config: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSummary {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiList {
    #[serde(default)]
    pub apis: Vec<ApiSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: PlanConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlanList {
    #[serde(default)]
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSummary {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApplicationList {
    #[serde(default)]
    pub items: Vec<ApplicationSummary>,
}

/// One application's subscription to one API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub application: String,
    pub api: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub apikey: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdapterGlobals {
    #[serde(default)]
    pub ignore_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Globals {
    #[serde(default)]
    pub kong_adapter: AdapterGlobals,
}

/// Registration of this adapter as a webhook listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookListener {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventEntity {
    Application,
    Subscription,
    Import,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Add,
    Update,
    Delete,
    KeyRotation,
    RevokeOldKey,
    #[serde(other)]
    Other,
}

/// A pending event in the control plane's queue for this listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub entity: EventEntity,
    pub action: EventKind,
    #[serde(default)]
    pub data: Value,
}

/// A freshly issued rotation key, reported back to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedKey {
    pub new_api_key: String,
    pub api_id: String,
    pub application_id: String,
}
