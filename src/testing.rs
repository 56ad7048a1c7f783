//! In-memory gateway and control plane for engine tests.
//!
//! Both fakes keep their state behind a `std::sync::Mutex` (never held across
//! an await), log every call, and fail any call whose name is in `fail_on`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

use crate::control_plane::{
    ApiConfig, ApiDefinition, ApiSummary, ApplicationSummary, ControlPlane, Plan, RotatedKey,
    Subscription, WebhookEvent, WebhookListener,
};
use crate::gateway::{
    EntityRef, GatewayAdmin, GatewayConsumer, GatewayPlugin, GatewayRoute, GatewayService,
    KeyCredential, PluginScope,
};
use crate::http::client::ClientError;

fn status_error(status: StatusCode, what: &str) -> ClientError {
    ClientError::Status {
        method: Method::GET,
        url: format!("fake://{what}"),
        status,
        body: String::new(),
    }
}

fn not_found(what: &str) -> ClientError {
    status_error(StatusCode::NOT_FOUND, what)
}

fn object(body: &Value) -> Map<String, Value> {
    body.as_object().cloned().unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct GatewayState {
    pub services: Vec<GatewayService>,
    /// Routes with the id of their service.
    pub routes: Vec<(String, GatewayRoute)>,
    pub plugins: Vec<GatewayPlugin>,
    pub consumers: Vec<GatewayConsumer>,
    /// Credentials with the id of their consumer.
    pub credentials: Vec<(String, KeyCredential)>,
    /// Mutations in call order, e.g. `add_service petstore`.
    pub ops: Vec<String>,
    pub fail_on: HashSet<&'static str>,
    next_id: u64,
}

impl GatewayState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check(&self, op: &'static str) -> Result<(), ClientError> {
        if self.fail_on.contains(op) {
            return Err(status_error(StatusCode::INTERNAL_SERVER_ERROR, op));
        }
        Ok(())
    }

    fn mutate(&mut self, op: &'static str, detail: &str) -> Result<(), ClientError> {
        self.check(op)?;
        self.ops.push(format!("{op} {detail}"));
        Ok(())
    }

    fn service_id(&self, id_or_name: &str) -> Option<String> {
        self.services
            .iter()
            .find(|s| s.id == id_or_name || s.name == id_or_name)
            .map(|s| s.id.clone())
    }

    fn consumer_id(&self, id_or_username: &str) -> Option<String> {
        self.consumers
            .iter()
            .find(|c| c.id == id_or_username || c.username == id_or_username)
            .map(|c| c.id.clone())
    }

    pub fn mutations(&self) -> usize {
        self.ops.len()
    }

    pub fn op_index(&self, prefix: &str) -> Option<usize> {
        self.ops.iter().position(|op| op.starts_with(prefix))
    }

    pub fn credentials_of(&self, username: &str) -> Vec<KeyCredential> {
        let Some(consumer_id) = self.consumer_id(username) else {
            return Vec::new();
        };
        self.credentials
            .iter()
            .filter(|(owner, _)| *owner == consumer_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn add_service_direct(&mut self, name: &str, fields: Value) -> String {
        let id = self.id("svc");
        self.services.push(GatewayService {
            id: id.clone(),
            name: name.to_string(),
            fields: object(&fields),
        });
        id
    }

    pub fn add_consumer_direct(&mut self, username: &str, tags: &[&str]) -> String {
        let id = self.id("consumer");
        self.consumers.push(GatewayConsumer {
            id: id.clone(),
            username: username.to_string(),
            custom_id: None,
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        });
        id
    }

    pub fn add_credential_direct(&mut self, username: &str, key: &str, tags: &[&str]) -> String {
        let id = self.id("cred");
        let consumer_id = self.consumer_id(username).unwrap_or_default();
        self.credentials.push((
            consumer_id,
            KeyCredential {
                id: id.clone(),
                key: key.to_string(),
                tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            },
        ));
        id
    }

    pub fn add_plugin_direct(&mut self, plugin: Value) -> String {
        let id = self.id("plugin");
        let mut plugin = object(&plugin);
        plugin.insert("id".into(), json!(id));
        if let Ok(parsed) = serde_json::from_value(Value::Object(plugin)) {
            self.plugins.push(parsed);
        }
        id
    }
}

/// Stores `url` the way the gateway does, decomposed.
fn normalize_service(body: &Value) -> Map<String, Value> {
    let mut fields = object(body);
    fields.remove("name");
    if let Some(url) = fields
        .remove("url")
        .and_then(|u| u.as_str().and_then(|u| Url::parse(u).ok()))
    {
        fields.insert("protocol".into(), json!(url.scheme()));
        fields.insert("host".into(), json!(url.host_str()));
        fields.insert("port".into(), json!(url.port_or_known_default()));
        fields.insert(
            "path".into(),
            if url.path() == "/" { Value::Null } else { json!(url.path()) },
        );
    }
    fields
}

fn plugin_fields(body: &Value) -> Map<String, Value> {
    let mut fields = object(body);
    for key in ["id", "name", "route", "service", "consumer"] {
        fields.remove(key);
    }
    fields
}

#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state().fail_on.insert(op);
    }
}

#[async_trait]
impl GatewayAdmin for FakeGateway {
    async fn ping(&self) -> Result<(), ClientError> {
        self.state().check("ping")
    }

    async fn list_services(&self) -> Result<Vec<GatewayService>, ClientError> {
        let state = self.state();
        state.check("list_services")?;
        Ok(state.services.clone())
    }

    async fn add_service(&self, body: &Value) -> Result<GatewayService, ClientError> {
        let mut state = self.state();
        let name = body["name"].as_str().unwrap_or_default().to_string();
        state.mutate("add_service", &name)?;
        let service = GatewayService {
            id: state.id("svc"),
            name,
            fields: normalize_service(body),
        };
        state.services.push(service.clone());
        Ok(service)
    }

    async fn update_service(&self, id: &str, body: &Value) -> Result<GatewayService, ClientError> {
        let mut state = self.state();
        state.mutate("update_service", id)?;
        let service = state
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found(id))?;
        service.fields.extend(normalize_service(body));
        Ok(service.clone())
    }

    async fn delete_service(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.mutate("delete_service", id)?;
        if state.routes.iter().any(|(service, _)| service == id) {
            return Err(status_error(StatusCode::BAD_REQUEST, "service still has routes"));
        }
        state.services.retain(|s| s.id != id);
        state
            .plugins
            .retain(|p| p.service.as_ref().map_or(true, |s| s.id != id));
        Ok(())
    }

    async fn list_routes(&self, service: &str) -> Result<Vec<GatewayRoute>, ClientError> {
        let state = self.state();
        state.check("list_routes")?;
        let id = state.service_id(service).ok_or_else(|| not_found(service))?;
        Ok(state
            .routes
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn add_route(&self, service: &str, body: &Value) -> Result<GatewayRoute, ClientError> {
        let mut state = self.state();
        let service_id = state.service_id(service).ok_or_else(|| not_found(service))?;
        let mut fields = object(body);
        let name = fields.remove("name").and_then(|n| n.as_str().map(String::from));
        state.mutate("add_route", name.as_deref().unwrap_or_default())?;
        let route = GatewayRoute {
            id: state.id("route"),
            name,
            fields,
        };
        state.routes.push((service_id, route.clone()));
        Ok(route)
    }

    async fn update_route(&self, id: &str, body: &Value) -> Result<GatewayRoute, ClientError> {
        let mut state = self.state();
        state.mutate("update_route", id)?;
        let (_, route) = state
            .routes
            .iter_mut()
            .find(|(_, r)| r.id == id)
            .ok_or_else(|| not_found(id))?;
        let mut fields = object(body);
        fields.remove("name");
        route.fields.extend(fields);
        Ok(route.clone())
    }

    async fn delete_route(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.mutate("delete_route", id)?;
        state.routes.retain(|(_, r)| r.id != id);
        state
            .plugins
            .retain(|p| p.route.as_ref().map_or(true, |r| r.id != id));
        Ok(())
    }

    async fn list_service_plugins(&self, service_id: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        let state = self.state();
        state.check("list_service_plugins")?;
        let route_ids: HashSet<&str> = state
            .routes
            .iter()
            .filter(|(owner, _)| owner == service_id)
            .map(|(_, r)| r.id.as_str())
            .collect();
        Ok(state
            .plugins
            .iter()
            .filter(|p| p.consumer.is_none())
            .filter(|p| {
                p.service.as_ref().is_some_and(|s| s.id == service_id)
                    || p.route.as_ref().is_some_and(|r| route_ids.contains(r.id.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn list_plugins_by_name(&self, name: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        let state = self.state();
        state.check("list_plugins_by_name")?;
        Ok(state.plugins.iter().filter(|p| p.name == name).cloned().collect())
    }

    async fn add_plugin(&self, scope: &PluginScope, body: &Value) -> Result<GatewayPlugin, ClientError> {
        let mut state = self.state();
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let (service, route, consumer) = match scope {
            PluginScope::Global => (None, None, None),
            PluginScope::Service(s) => {
                (Some(state.service_id(s).ok_or_else(|| not_found(s))?), None, None)
            }
            PluginScope::Route(r) => {
                if !state.routes.iter().any(|(_, route)| route.id == *r) {
                    return Err(not_found(r));
                }
                (None, Some(r.clone()), None)
            }
            PluginScope::ConsumerOnService {
                consumer_id,
                service,
            } => (
                Some(state.service_id(service).ok_or_else(|| not_found(service))?),
                None,
                Some(consumer_id.clone()),
            ),
        };
        state.mutate("add_plugin", &name)?;
        let plugin = GatewayPlugin {
            id: state.id("plugin"),
            name,
            route: route.map(|id| EntityRef { id }),
            service: service.map(|id| EntityRef { id }),
            consumer: consumer.map(|id| EntityRef { id }),
            fields: plugin_fields(body),
        };
        state.plugins.push(plugin.clone());
        Ok(plugin)
    }

    async fn update_plugin(&self, id: &str, body: &Value) -> Result<GatewayPlugin, ClientError> {
        let mut state = self.state();
        state.mutate("update_plugin", id)?;
        let plugin = state
            .plugins
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found(id))?;
        plugin.fields.extend(plugin_fields(body));
        Ok(plugin.clone())
    }

    async fn delete_plugin(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.mutate("delete_plugin", id)?;
        state.plugins.retain(|p| p.id != id);
        Ok(())
    }

    async fn list_consumers(&self) -> Result<Vec<GatewayConsumer>, ClientError> {
        let state = self.state();
        state.check("list_consumers")?;
        Ok(state.consumers.clone())
    }

    async fn get_consumer(&self, username: &str) -> Result<Option<GatewayConsumer>, ClientError> {
        let state = self.state();
        state.check("get_consumer")?;
        Ok(state
            .consumers
            .iter()
            .find(|c| c.username == username || c.id == username)
            .cloned())
    }

    async fn add_consumer(&self, body: &Value) -> Result<GatewayConsumer, ClientError> {
        let mut state = self.state();
        let username = body["username"].as_str().unwrap_or_default().to_string();
        if state.consumer_id(&username).is_some() {
            return Err(status_error(StatusCode::CONFLICT, &username));
        }
        state.mutate("add_consumer", &username)?;
        let consumer = GatewayConsumer {
            id: state.id("consumer"),
            username,
            custom_id: body["custom_id"].as_str().map(String::from),
            tags: None,
        };
        state.consumers.push(consumer.clone());
        Ok(consumer)
    }

    async fn update_consumer(&self, id: &str, body: &Value) -> Result<GatewayConsumer, ClientError> {
        let mut state = self.state();
        state.mutate("update_consumer", id)?;
        let consumer = state
            .consumers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found(id))?;
        if let Some(custom_id) = body["custom_id"].as_str() {
            consumer.custom_id = Some(custom_id.to_string());
        }
        Ok(consumer.clone())
    }

    async fn delete_consumer(&self, username_or_id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let id = state
            .consumer_id(username_or_id)
            .ok_or_else(|| not_found(username_or_id))?;
        state.mutate("delete_consumer", username_or_id)?;
        state.consumers.retain(|c| c.id != id);
        state.credentials.retain(|(owner, _)| *owner != id);
        state
            .plugins
            .retain(|p| p.consumer.as_ref().map_or(true, |c| c.id != id));
        Ok(())
    }

    async fn list_consumer_plugins(&self, consumer_id: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        let state = self.state();
        state.check("list_consumer_plugins")?;
        Ok(state
            .plugins
            .iter()
            .filter(|p| p.consumer.as_ref().is_some_and(|c| c.id == consumer_id))
            .cloned()
            .collect())
    }

    async fn list_key_credentials(&self, username: &str) -> Result<Vec<KeyCredential>, ClientError> {
        let state = self.state();
        state.check("list_key_credentials")?;
        if state.consumer_id(username).is_none() {
            return Err(not_found(username));
        }
        Ok(state.credentials_of(username))
    }

    async fn add_key_credential(
        &self,
        username: &str,
        key: Option<&str>,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError> {
        let mut state = self.state();
        let consumer_id = state.consumer_id(username).ok_or_else(|| not_found(username))?;
        state.mutate("add_key_credential", username)?;
        let id = state.id("cred");
        let credential = KeyCredential {
            key: key.map(String::from).unwrap_or_else(|| format!("generated-{id}")),
            id,
            tags: Some(tags.to_vec()),
        };
        state.credentials.push((consumer_id, credential.clone()));
        Ok(credential)
    }

    async fn update_key_credential_tags(
        &self,
        username: &str,
        id: &str,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError> {
        let mut state = self.state();
        state.mutate("update_key_credential_tags", username)?;
        let (_, credential) = state
            .credentials
            .iter_mut()
            .find(|(_, c)| c.id == id)
            .ok_or_else(|| not_found(id))?;
        credential.tags = Some(tags.to_vec());
        Ok(credential.clone())
    }

    async fn delete_key_credential(&self, username: &str, id_or_key: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let consumer_id = state.consumer_id(username).ok_or_else(|| not_found(username))?;
        let exists = state
            .credentials
            .iter()
            .any(|(owner, c)| *owner == consumer_id && (c.id == id_or_key || c.key == id_or_key));
        if !exists {
            return Err(not_found(id_or_key));
        }
        state.mutate("delete_key_credential", id_or_key)?;
        state
            .credentials
            .retain(|(owner, c)| !(*owner == consumer_id && (c.id == id_or_key || c.key == id_or_key)));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ControlPlaneState {
    pub apis: Vec<ApiDefinition>,
    pub plans: Vec<Plan>,
    pub applications: Vec<String>,
    pub subscriptions: Vec<Subscription>,
    pub ignore_list: Vec<String>,
    /// Pending events, oldest first.
    pub events: Vec<WebhookEvent>,
    pub acknowledged: Vec<String>,
    pub flushes: usize,
    pub listeners: Vec<WebhookListener>,
    pub rotated: Vec<RotatedKey>,
    /// Every call in order.
    pub calls: Vec<String>,
    pub fail_on: HashSet<&'static str>,
}

impl ControlPlaneState {
    fn call(&mut self, op: &'static str) -> Result<(), ClientError> {
        self.calls.push(op.to_string());
        if self.fail_on.contains(op) {
            return Err(status_error(StatusCode::SERVICE_UNAVAILABLE, op));
        }
        Ok(())
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| *c == op).count()
    }

    pub fn add_api(&mut self, id: &str, config: Value) {
        self.apis.push(ApiDefinition {
            id: id.to_string(),
            config: serde_json::from_value(config).unwrap_or_default(),
        });
    }

    pub fn subscribe(&mut self, id: &str, app: &str, api: &str, plan: Option<&str>, apikey: Option<&str>) {
        if !self.applications.iter().any(|a| a == app) {
            self.applications.push(app.to_string());
        }
        self.subscriptions.push(Subscription {
            id: id.to_string(),
            application: app.to_string(),
            api: api.to_string(),
            plan: plan.map(String::from),
            auth: Some("key-auth".to_string()),
            approved: true,
            apikey: apikey.map(String::from),
        });
    }
}

#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<ControlPlaneState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ControlPlaneState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state().fail_on.insert(op);
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn ping(&self) -> Result<(), ClientError> {
        self.state().call("ping")
    }

    async fn list_apis(&self) -> Result<Vec<ApiSummary>, ClientError> {
        let mut state = self.state();
        state.call("list_apis")?;
        Ok(state
            .apis
            .iter()
            .map(|a| ApiSummary { id: a.id.clone() })
            .collect())
    }

    async fn get_api_config(&self, api_id: &str) -> Result<ApiConfig, ClientError> {
        let mut state = self.state();
        state.call("get_api_config")?;
        state
            .apis
            .iter()
            .find(|a| a.id == api_id)
            .map(|a| a.config.clone())
            .ok_or_else(|| not_found(api_id))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, ClientError> {
        let mut state = self.state();
        state.call("list_plans")?;
        Ok(state.plans.clone())
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationSummary>, ClientError> {
        let mut state = self.state();
        state.call("list_applications")?;
        Ok(state
            .applications
            .iter()
            .map(|id| ApplicationSummary { id: id.clone() })
            .collect())
    }

    async fn list_app_subscriptions(&self, app_id: &str) -> Result<Vec<Subscription>, ClientError> {
        let mut state = self.state();
        state.call("list_app_subscriptions")?;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| s.application == app_id)
            .cloned()
            .collect())
    }

    async fn get_ignore_list(&self) -> Result<Vec<String>, ClientError> {
        let mut state = self.state();
        state.call("get_ignore_list")?;
        Ok(state.ignore_list.clone())
    }

    async fn get_webhook_events(&self, _listener: &str) -> Result<Vec<WebhookEvent>, ClientError> {
        let mut state = self.state();
        state.call("get_webhook_events")?;
        Ok(state.events.clone())
    }

    async fn delete_webhook_event(&self, _listener: &str, event_id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("delete_webhook_event")?;
        state.events.retain(|e| e.id != event_id);
        state.acknowledged.push(event_id.to_string());
        Ok(())
    }

    async fn flush_webhook_events(&self, _listener: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("flush_webhook_events")?;
        state.events.clear();
        state.flushes += 1;
        Ok(())
    }

    async fn upsert_webhook_listener(&self, listener: &WebhookListener) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("upsert_webhook_listener")?;
        state.listeners.retain(|l| l.id != listener.id);
        state.listeners.push(listener.clone());
        Ok(())
    }

    async fn notify_rotated_key(&self, key: &RotatedKey) -> Result<(), ClientError> {
        let mut state = self.state();
        state.call("notify_rotated_key")?;
        state.rotated.push(key.clone());
        Ok(())
    }
}

/// Plans keyed by id, as the orchestrator indexes them.
pub fn plans_by_id(plans: &[Plan]) -> HashMap<String, Plan> {
    plans.iter().map(|p| (p.id.clone(), p.clone())).collect()
}
