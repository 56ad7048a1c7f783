//! Fetch, diff and apply passes against the gateway.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use serde_json::json;

use crate::config::SyncConfig;
use crate::control_plane::{ApiDefinition, ControlPlane, Plan, Subscription};
use crate::gateway::{GatewayAdmin, GatewayApi, GatewayConsumer, GatewayPlugin, GatewayService, PluginScope};
use crate::http::client::ClientError;
use crate::keys::ROTATE_KEY_TAG;
use crate::observability::metrics as telemetry;
use crate::sync::apply::{for_each_bounded, map_bounded};
use crate::sync::cache::ApiCache;
use crate::sync::desired::{consumers_from_subscriptions, ConsumerDefinition};
use crate::sync::matching::{fields_match, IgnoreList};
use crate::sync::naming::username;
use crate::sync::todo::{
    assemble_api_todos, assemble_consumer_plugin_todos, assemble_consumer_todos,
    assemble_plugin_todos, assemble_route_todos, PluginTodos,
};
use crate::sync::{EntityKind, SyncError, SyncResult};

const PROMETHEUS_PLUGIN: &str = "prometheus";

/// Treats a 404 on delete as already done.
fn absent_ok(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(error) if error.is_not_found() => Ok(()),
        other => other,
    }
}

/// Reconciles APIs and consumers on the gateway with the control plane.
pub struct SyncOrchestrator {
    gateway: Arc<dyn GatewayAdmin>,
    control_plane: Arc<dyn ControlPlane>,
    cache: ApiCache,
    ignore: ArcSwap<IgnoreList>,
    configured_ignore: Vec<String>,
    ignore_tag: Option<String>,
    limit: usize,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn GatewayAdmin>,
        control_plane: Arc<dyn ControlPlane>,
        config: &SyncConfig,
    ) -> Self {
        let ignore_tag = Some(config.ignore_tag.clone()).filter(|t| !t.is_empty());
        let ignore = IgnoreList::new(config.ignore_list.iter().cloned(), ignore_tag.clone());
        Self {
            gateway,
            control_plane,
            cache: ApiCache::new(),
            ignore: ArcSwap::from_pointee(ignore),
            configured_ignore: config.ignore_list.clone(),
            ignore_tag,
            limit: config.max_concurrency.max(1),
        }
    }

    pub fn ignore_list(&self) -> Arc<IgnoreList> {
        self.ignore.load_full()
    }

    /// Union of the configured list and the control plane's list.
    ///
    /// Falls back to the configured list when the fetch fails.
    pub async fn refresh_ignore_list(&self) {
        let remote = match self.control_plane.get_ignore_list().await {
            Ok(names) => names,
            Err(error) => {
                tracing::warn!(%error, "Failed to fetch ignore list, using configured entries only");
                Vec::new()
            }
        };
        let list = IgnoreList::new(
            self.configured_ignore.iter().cloned().chain(remote),
            self.ignore_tag.clone(),
        );
        tracing::info!(entries = list.len(), "Ignore list refreshed");
        self.ignore.store(Arc::new(list));
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    // ---- APIs ----

    /// Reconcile services, routes and plugins.
    ///
    /// With `changed` set, only those APIs are updated; additions and
    /// deletions always run.
    pub async fn sync_apis(&self, changed: Option<&HashSet<String>>) -> SyncResult<()> {
        let started = Instant::now();
        let result = self.sync_apis_pass(changed).await;
        telemetry::record_pass("apis", result.is_ok(), started.elapsed());
        result
    }

    async fn sync_apis_pass(&self, changed: Option<&HashSet<String>>) -> SyncResult<()> {
        let (desired, actual) = tokio::try_join!(self.desired_apis(), self.actual_apis())?;
        let todos = assemble_api_todos(&desired, &actual, changed);
        telemetry::record_todos(
            EntityKind::Api,
            todos.add.len(),
            todos.update.len(),
            todos.delete.len(),
        );
        tracing::info!(
            add = todos.add.len(),
            update = todos.update.len(),
            delete = todos.delete.len(),
            "API todo list assembled"
        );

        for_each_bounded(todos.update.iter().copied(), self.limit, |u| {
            self.update_api(u.desired, u.actual)
        })
        .await?;
        for_each_bounded(todos.delete.iter().copied(), self.limit, |api| self.delete_api(api)).await?;
        for_each_bounded(todos.add.iter().copied(), self.limit, |api| self.add_api(api)).await?;
        Ok(())
    }

    async fn desired_apis(&self) -> SyncResult<Arc<Vec<ApiDefinition>>> {
        if let Some(apis) = self.cache.apis() {
            return Ok(apis);
        }
        let summaries = self
            .control_plane
            .list_apis()
            .await
            .map_err(SyncError::fetch("apis"))?;
        let control_plane = &self.control_plane;
        let mut apis = map_bounded(summaries, self.limit, |summary| async move {
            let config = control_plane.get_api_config(&summary.id).await?;
            Ok::<_, ClientError>(ApiDefinition {
                id: summary.id,
                config,
            })
        })
        .await
        .map_err(SyncError::fetch("api configs"))?;
        apis.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(count = apis.len(), "Desired APIs loaded");
        Ok(self.cache.store_apis(apis))
    }

    async fn actual_apis(&self) -> SyncResult<Vec<GatewayApi>> {
        let services = self
            .gateway
            .list_services()
            .await
            .map_err(SyncError::fetch("services"))?;
        let gateway = &self.gateway;
        map_bounded(services, self.limit, |service| async move {
            let plugins = gateway.list_service_plugins(&service.id).await?;
            Ok::<_, ClientError>(GatewayApi { service, plugins })
        })
        .await
        .map_err(SyncError::fetch("service plugins"))
    }

    async fn add_api(&self, desired: &ApiDefinition) -> SyncResult<()> {
        let service = self
            .gateway
            .add_service(&desired.config.api.body(&desired.id))
            .await
            .map_err(SyncError::apply(EntityKind::Api))?;
        tracing::info!(api = %desired.id, service = %service.id, "Added API");

        self.sync_routes(desired, &service).await?;
        let actual = GatewayApi {
            service,
            plugins: Vec::new(),
        };
        self.sync_plugins(desired, &actual).await
    }

    async fn update_api(&self, desired: &ApiDefinition, actual: &GatewayApi) -> SyncResult<()> {
        let mut expected = desired.config.api.comparable_body(&desired.id);
        let differs = match expected.as_object_mut() {
            Some(map) => {
                map.remove("name");
                !fields_match(map, &actual.service.fields)
            }
            None => true,
        };
        if differs {
            self.gateway
                .update_service(&actual.service.id, &desired.config.api.body(&desired.id))
                .await
                .map_err(SyncError::apply(EntityKind::Api))?;
            tracing::info!(api = %desired.id, "Updated service");
        }

        self.sync_routes(desired, &actual.service).await?;
        self.sync_plugins(desired, actual).await
    }

    async fn delete_api(&self, actual: &GatewayApi) -> SyncResult<()> {
        let service_id = &actual.service.id;
        let routes = self
            .gateway
            .list_routes(service_id)
            .await
            .map_err(SyncError::fetch("routes"))?;
        for route in &routes {
            absent_ok(self.gateway.delete_route(&route.id).await)
                .map_err(SyncError::apply(EntityKind::Route))?;
        }
        absent_ok(self.gateway.delete_service(service_id).await)
            .map_err(SyncError::apply(EntityKind::Api))?;
        tracing::info!(api = %actual.name(), routes = routes.len(), "Deleted API");
        Ok(())
    }

    async fn sync_routes(&self, desired: &ApiDefinition, service: &GatewayService) -> SyncResult<()> {
        let actual = self
            .gateway
            .list_routes(&service.id)
            .await
            .map_err(SyncError::fetch("routes"))?;
        let todos = assemble_route_todos(&desired.config.api.routes, &actual);
        if todos.is_empty() {
            return Ok(());
        }
        telemetry::record_todos(
            EntityKind::Route,
            todos.add.len(),
            todos.update.len(),
            todos.delete.len(),
        );

        for update in &todos.update {
            self.gateway
                .update_route(&update.actual.id, &update.desired.body())
                .await
                .map_err(SyncError::apply(EntityKind::Route))?;
        }
        for route in &todos.delete {
            absent_ok(self.gateway.delete_route(&route.id).await).map_err(SyncError::apply(EntityKind::Route))?;
        }
        for route in &todos.add {
            self.gateway
                .add_route(&service.id, &route.body())
                .await
                .map_err(SyncError::apply(EntityKind::Route))?;
        }
        tracing::debug!(
            api = %desired.id,
            add = todos.add.len(),
            update = todos.update.len(),
            delete = todos.delete.len(),
            "Routes reconciled"
        );
        Ok(())
    }

    /// Reconcile the service and route plugins of one API.
    ///
    /// A failed route lookup leaves route-level plugins alone for this pass.
    pub async fn sync_plugins(&self, desired: &ApiDefinition, actual: &GatewayApi) -> SyncResult<()> {
        let route_ids: Option<HashMap<String, String>> = if desired.config.api.route_scoped_plugins() {
            match self.gateway.list_routes(&actual.service.id).await {
                Ok(routes) => Some(
                    routes
                        .into_iter()
                        .filter_map(|r| r.name.map(|name| (r.id, name)))
                        .collect(),
                ),
                Err(error) => {
                    tracing::warn!(api = %desired.id, %error, "Route lookup failed, skipping route plugins");
                    None
                }
            }
        } else {
            None
        };

        let ignore = self.ignore_list();
        let todos = assemble_plugin_todos(&desired.config, &actual.plugins, route_ids.as_ref(), &ignore);
        if todos.is_empty() {
            return Ok(());
        }
        telemetry::record_todos(
            EntityKind::Plugin,
            todos.add.len(),
            todos.update.len(),
            todos.delete.len(),
        );

        let by_name: HashMap<&str, &str> = route_ids
            .iter()
            .flatten()
            .map(|(id, name)| (name.as_str(), id.as_str()))
            .collect();

        for add in &todos.add {
            let scope = match add.route {
                None => PluginScope::Service(actual.service.id.clone()),
                Some(route) => match by_name.get(route) {
                    Some(id) => PluginScope::Route((*id).to_string()),
                    None => {
                        tracing::warn!(api = %desired.id, route = %route, plugin = %add.plugin.name, "Route not found, plugin not added");
                        continue;
                    }
                },
            };
            self.gateway
                .add_plugin(&scope, &add.plugin.to_value())
                .await
                .map_err(SyncError::apply(EntityKind::Plugin))?;
        }
        self.apply_plugin_changes(&todos, EntityKind::Plugin).await?;

        tracing::info!(
            api = %desired.id,
            add = todos.add.len(),
            update = todos.update.len(),
            delete = todos.delete.len(),
            "Plugins reconciled"
        );
        Ok(())
    }

    /// Update and delete stages shared by API and consumer plugins.
    async fn apply_plugin_changes(&self, todos: &PluginTodos<'_>, kind: EntityKind) -> SyncResult<()> {
        for update in &todos.update {
            self.gateway
                .update_plugin(&update.actual.id, &update.desired.to_value())
                .await
                .map_err(SyncError::apply(kind))?;
        }
        for plugin in &todos.delete {
            absent_ok(self.gateway.delete_plugin(&plugin.id).await).map_err(SyncError::apply(kind))?;
        }
        Ok(())
    }

    /// Make sure exactly one global metrics plugin exists.
    pub async fn ensure_prometheus_plugin(&self) -> SyncResult<()> {
        let global: Vec<GatewayPlugin> = self
            .gateway
            .list_plugins_by_name(PROMETHEUS_PLUGIN)
            .await
            .map_err(SyncError::fetch("prometheus plugin"))?
            .into_iter()
            .filter(GatewayPlugin::is_global)
            .collect();

        match global.len() {
            0 => {
                self.gateway
                    .add_plugin(
                        &PluginScope::Global,
                        &json!({ "name": PROMETHEUS_PLUGIN, "enabled": true }),
                    )
                    .await
                    .map_err(SyncError::apply(EntityKind::Plugin))?;
                tracing::info!("Added global prometheus plugin");
                Ok(())
            }
            1 => Ok(()),
            n => Err(SyncError::Conflict(format!(
                "{n} global {PROMETHEUS_PLUGIN} plugins configured, expected one"
            ))),
        }
    }

    // ---- Consumers ----

    async fn plans(&self) -> SyncResult<Arc<HashMap<String, Plan>>> {
        if let Some(plans) = self.cache.plans() {
            return Ok(plans);
        }
        let plans = self
            .control_plane
            .list_plans()
            .await
            .map_err(SyncError::fetch("plans"))?;
        Ok(self
            .cache
            .store_plans(plans.into_iter().map(|p| (p.id.clone(), p)).collect()))
    }

    async fn all_subscriptions(&self) -> SyncResult<Vec<Subscription>> {
        let applications = self
            .control_plane
            .list_applications()
            .await
            .map_err(SyncError::fetch("applications"))?;
        let control_plane = &self.control_plane;
        let per_app = map_bounded(applications, self.limit, |app| async move {
            control_plane.list_app_subscriptions(&app.id).await
        })
        .await
        .map_err(SyncError::fetch("subscriptions"))?;
        Ok(per_app.into_iter().flatten().collect())
    }

    async fn desired_consumers(&self) -> SyncResult<Vec<ConsumerDefinition>> {
        let (plans, subscriptions) = tokio::try_join!(self.plans(), self.all_subscriptions())?;
        Ok(consumers_from_subscriptions(&subscriptions, &plans))
    }

    /// Reconcile every consumer on the gateway.
    pub async fn sync_all_consumers(&self) -> SyncResult<()> {
        let started = Instant::now();
        let result = async {
            let (desired, actual) = tokio::try_join!(self.desired_consumers(), async {
                self.gateway
                    .list_consumers()
                    .await
                    .map_err(SyncError::fetch("consumers"))
            })?;
            self.apply_consumers(&desired, &actual).await
        }
        .await;
        telemetry::record_pass("consumers", result.is_ok(), started.elapsed());
        result
    }

    /// Reconcile the consumers of one application.
    ///
    /// Consumers of subscriptions that are no longer approved are removed.
    pub async fn sync_app_consumers(&self, app_id: &str) -> SyncResult<()> {
        let (plans, subscriptions) = tokio::try_join!(self.plans(), async {
            self.control_plane
                .list_app_subscriptions(app_id)
                .await
                .map_err(SyncError::fetch("subscriptions"))
        })?;
        let desired = consumers_from_subscriptions(&subscriptions, &plans);

        let usernames: HashSet<String> = subscriptions
            .iter()
            .map(|s| username(&s.application, &s.api))
            .collect();
        let gateway = &self.gateway;
        let actual: Vec<GatewayConsumer> = map_bounded(usernames, self.limit, |name| async move {
            gateway.get_consumer(&name).await
        })
        .await
        .map_err(SyncError::fetch("consumers"))?
        .into_iter()
        .flatten()
        .collect();

        tracing::debug!(app = %app_id, desired = desired.len(), actual = actual.len(), "Syncing application consumers");
        self.apply_consumers(&desired, &actual).await
    }

    async fn apply_consumers(&self, desired: &[ConsumerDefinition], actual: &[GatewayConsumer]) -> SyncResult<()> {
        let ignore = self.ignore_list();
        let todos = assemble_consumer_todos(desired, actual, &ignore);
        telemetry::record_todos(
            EntityKind::Consumer,
            todos.add.len(),
            todos.update.len(),
            todos.delete.len(),
        );

        for_each_bounded(todos.add.iter().copied(), self.limit, |c| self.add_consumer(c)).await?;
        for_each_bounded(todos.update.iter().copied(), self.limit, |u| {
            self.update_consumer(u.desired, u.actual)
        })
        .await?;
        for_each_bounded(todos.delete.iter().copied(), self.limit, |c| async move {
            absent_ok(self.gateway.delete_consumer(&c.id).await).map_err(SyncError::apply(EntityKind::Consumer))?;
            tracing::info!(consumer = %c.username, "Deleted consumer");
            Ok::<_, SyncError>(())
        })
        .await?;

        if !todos.add.is_empty() || !todos.delete.is_empty() {
            tracing::info!(
                add = todos.add.len(),
                delete = todos.delete.len(),
                checked = todos.update.len(),
                "Consumers reconciled"
            );
        }
        Ok(())
    }

    async fn add_consumer(&self, desired: &ConsumerDefinition) -> SyncResult<()> {
        let consumer = self
            .gateway
            .add_consumer(&desired.body())
            .await
            .map_err(SyncError::apply(EntityKind::Consumer))?;
        tracing::info!(consumer = %consumer.username, "Added consumer");
        self.sync_consumer_state(desired, &consumer).await
    }

    async fn update_consumer(&self, desired: &ConsumerDefinition, actual: &GatewayConsumer) -> SyncResult<()> {
        if actual.custom_id.as_deref() != Some(desired.custom_id.as_str()) {
            self.gateway
                .update_consumer(&actual.id, &json!({ "custom_id": desired.custom_id }))
                .await
                .map_err(SyncError::apply(EntityKind::Consumer))?;
        }
        self.sync_consumer_state(desired, actual).await
    }

    async fn sync_consumer_state(&self, desired: &ConsumerDefinition, consumer: &GatewayConsumer) -> SyncResult<()> {
        if let Some(key) = desired.api_key.as_deref() {
            self.sync_credentials(&consumer.username, key).await?;
        }

        let actual = self
            .gateway
            .list_consumer_plugins(&consumer.id)
            .await
            .map_err(SyncError::fetch("consumer plugins"))?;
        let ignore = self.ignore_list();
        let todos = assemble_consumer_plugin_todos(&desired.plugins, &actual, &ignore);
        if todos.is_empty() {
            return Ok(());
        }
        telemetry::record_todos(
            EntityKind::ConsumerPlugin,
            todos.add.len(),
            todos.update.len(),
            todos.delete.len(),
        );

        let scope = PluginScope::ConsumerOnService {
            consumer_id: consumer.id.clone(),
            service: desired.api_id.clone(),
        };
        for add in &todos.add {
            self.gateway
                .add_plugin(&scope, &add.plugin.to_value())
                .await
                .map_err(SyncError::apply(EntityKind::ConsumerPlugin))?;
        }
        self.apply_plugin_changes(&todos, EntityKind::ConsumerPlugin).await
    }

    /// The consumer holds `key`; stale keys go unless a rotation is in flight.
    async fn sync_credentials(&self, username: &str, key: &str) -> SyncResult<()> {
        let credentials = self
            .gateway
            .list_key_credentials(username)
            .await
            .map_err(SyncError::fetch("key credentials"))?;

        if !credentials.iter().any(|c| c.key == key) {
            self.gateway
                .add_key_credential(username, Some(key), &[])
                .await
                .map_err(SyncError::apply(EntityKind::Credential))?;
            tracing::debug!(consumer = %username, "Added key credential");
        }
        if credentials.iter().any(|c| c.has_tag(ROTATE_KEY_TAG)) {
            return Ok(());
        }
        for stale in credentials.iter().filter(|c| c.key != key) {
            absent_ok(self.gateway.delete_key_credential(username, &stale.id).await)
                .map_err(SyncError::apply(EntityKind::Credential))?;
            tracing::debug!(consumer = %username, credential = %stale.id, "Removed stale key credential");
        }
        Ok(())
    }

    /// Remove the consumers of `api_ids` subscribed by `app_id`.
    pub async fn delete_app_consumers(&self, app_id: &str, api_ids: &[String]) -> SyncResult<()> {
        for_each_bounded(api_ids, self.limit, |api_id| {
            self.delete_subscription_consumer(app_id, api_id)
        })
        .await
    }

    /// Remove the consumer of one subscription; an absent consumer counts as removed.
    pub async fn delete_subscription_consumer(&self, app_id: &str, api_id: &str) -> SyncResult<()> {
        let username = username(app_id, api_id);
        absent_ok(self.gateway.delete_consumer(&username).await)
            .map_err(SyncError::apply(EntityKind::Consumer))?;
        tracing::info!(consumer = %username, "Deleted subscription consumer");
        Ok(())
    }

    /// Delete every consumer not protected by the ignore list. Returns the count.
    pub async fn wipe_all_consumers(&self) -> SyncResult<usize> {
        let consumers = self
            .gateway
            .list_consumers()
            .await
            .map_err(SyncError::fetch("consumers"))?;
        let ignore = self.ignore_list();
        let doomed: Vec<&GatewayConsumer> = consumers.iter().filter(|c| !ignore.ignores_consumer(c)).collect();

        for_each_bounded(doomed.iter().copied(), self.limit, |c| async move {
            absent_ok(self.gateway.delete_consumer(&c.id).await).map_err(SyncError::apply(EntityKind::Consumer))
        })
        .await?;
        tracing::warn!(deleted = doomed.len(), kept = consumers.len() - doomed.len(), "Wiped gateway consumers");
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::types::PlanConfig;
    use crate::control_plane::PluginConfig;
    use crate::testing::{FakeControlPlane, FakeGateway};
    use serde_json::{json, Value};

    fn setup() -> (Arc<FakeGateway>, Arc<FakeControlPlane>, SyncOrchestrator) {
        setup_with(SyncConfig::default())
    }

    fn setup_with(config: SyncConfig) -> (Arc<FakeGateway>, Arc<FakeControlPlane>, SyncOrchestrator) {
        let gateway = Arc::new(FakeGateway::new());
        let control_plane = Arc::new(FakeControlPlane::new());
        let orchestrator = SyncOrchestrator::new(gateway.clone(), control_plane.clone(), &config);
        (gateway, control_plane, orchestrator)
    }

    fn api_config(url: &str) -> Value {
        json!({
            "api": {
                "url": url,
                "retries": 3,
                "routes": [{"name": "default", "paths": ["/pets"], "strip_path": true}]
            },
            "plugins": [
                {"name": "cors", "config": {"origins": ["*"]}},
                {"name": "rate-limiting", "config": {"minute": 100}}
            ]
        })
    }

    fn plan(id: &str, minute: u64) -> Plan {
        Plan {
            id: id.into(),
            name: id.into(),
            config: PlanConfig {
                plugins: vec![PluginConfig {
                    name: "rate-limiting".into(),
                    fields: json!({"config": {"minute": minute}})
                        .as_object()
                        .cloned()
                        .unwrap(),
                }],
            },
        }
    }

    #[tokio::test]
    async fn test_full_sync_then_nothing_to_do() {
        let (gateway, control_plane, orchestrator) = setup();
        {
            let mut cp = control_plane.state();
            cp.add_api("petstore", api_config("http://pets.internal:8080/v2"));
            cp.add_api("weather", api_config("https://weather.internal"));
        }

        orchestrator.sync_apis(None).await.unwrap();
        {
            let state = gateway.state();
            assert_eq!(state.services.len(), 2);
            assert_eq!(state.routes.len(), 2);
            assert_eq!(state.plugins.len(), 4);
        }

        let before = gateway.state().mutations();
        orchestrator.sync_apis(None).await.unwrap();
        assert_eq!(gateway.state().mutations(), before);
    }

    #[tokio::test]
    async fn test_apply_order_update_delete_add() {
        let (gateway, control_plane, orchestrator) = setup();
        {
            let mut cp = control_plane.state();
            cp.add_api("a", api_config("http://a.internal"));
            cp.add_api("b", api_config("http://b.internal"));
        }
        {
            let mut state = gateway.state();
            state.add_service_direct("b", json!({"protocol": "http", "host": "old.internal", "port": 80}));
            state.add_service_direct("c", json!({"protocol": "http", "host": "c.internal", "port": 80}));
        }

        orchestrator.sync_apis(None).await.unwrap();

        let state = gateway.state();
        let update = state.op_index("update_service").unwrap();
        let delete = state.op_index("delete_service").unwrap();
        let add = state.op_index("add_service").unwrap();
        assert!(update < delete && delete < add);
        let mut names: Vec<&str> = state.services.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_restricted_sync_skips_unchanged_updates() {
        let (gateway, control_plane, orchestrator) = setup();
        control_plane.state().add_api("b", api_config("http://b.internal"));
        gateway
            .state()
            .add_service_direct("b", json!({"protocol": "http", "host": "old.internal", "port": 80}));

        let changed = HashSet::from(["other".to_string()]);
        orchestrator.sync_apis(Some(&changed)).await.unwrap();
        assert_eq!(gateway.state().mutations(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_applies_nothing() {
        let (gateway, control_plane, orchestrator) = setup();
        control_plane.state().add_api("a", api_config("http://a.internal"));
        gateway.state().add_service_direct("stale", json!({}));
        control_plane.fail_on("get_api_config");

        let err = orchestrator.sync_apis(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }));
        assert_eq!(gateway.state().mutations(), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_skips_add() {
        let (gateway, control_plane, orchestrator) = setup();
        control_plane.state().add_api("a", api_config("http://a.internal"));
        gateway.state().add_service_direct("stale", json!({}));
        gateway.fail_on("delete_service");

        let err = orchestrator.sync_apis(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Apply { kind: EntityKind::Api, .. }));
        assert!(gateway.state().op_index("add_service").is_none());
    }

    #[tokio::test]
    async fn test_cache_reused_until_invalidated() {
        let (_, control_plane, orchestrator) = setup();
        control_plane.state().add_api("a", api_config("http://a.internal"));

        orchestrator.sync_apis(None).await.unwrap();
        orchestrator.sync_apis(None).await.unwrap();
        assert_eq!(control_plane.state().count("list_apis"), 1);

        orchestrator.invalidate_cache();
        orchestrator.sync_apis(None).await.unwrap();
        assert_eq!(control_plane.state().count("list_apis"), 2);
    }

    #[tokio::test]
    async fn test_route_scoped_plugins_attach_to_routes() {
        let (gateway, control_plane, orchestrator) = setup();
        control_plane.state().add_api(
            "petstore",
            json!({
                "api": {
                    "url": "http://pets.internal",
                    "enable_routes": true,
                    "routes": [
                        {"name": "read", "paths": ["/read"], "plugins": [{"name": "rate-limiting", "config": {"minute": 100}}]},
                        {"name": "write", "paths": ["/write"], "plugins": [{"name": "rate-limiting", "config": {"minute": 5}}]}
                    ]
                },
                "plugins": [{"name": "cors"}]
            }),
        );

        orchestrator.sync_apis(None).await.unwrap();
        {
            let state = gateway.state();
            let route_plugins = state.plugins.iter().filter(|p| p.is_route_scoped()).count();
            assert_eq!(route_plugins, 2);
            assert_eq!(state.plugins.len(), 3);
        }

        let before = gateway.state().mutations();
        orchestrator.sync_apis(None).await.unwrap();
        assert_eq!(gateway.state().mutations(), before);
    }

    #[tokio::test]
    async fn test_prometheus_plugin_added_once() {
        let (gateway, _, orchestrator) = setup();

        orchestrator.ensure_prometheus_plugin().await.unwrap();
        orchestrator.ensure_prometheus_plugin().await.unwrap();

        let state = gateway.state();
        assert_eq!(state.plugins.iter().filter(|p| p.is_global()).count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_prometheus_plugins_conflict() {
        let (gateway, _, orchestrator) = setup();
        {
            let mut state = gateway.state();
            state.add_plugin_direct(json!({"name": "prometheus"}));
            state.add_plugin_direct(json!({"name": "prometheus"}));
        }

        let err = orchestrator.ensure_prometheus_plugin().await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_ignore_list_union_and_fallback() {
        let config = SyncConfig {
            ignore_list: vec!["acl".into()],
            ..SyncConfig::default()
        };
        let (_, control_plane, orchestrator) = setup_with(config);
        control_plane.state().ignore_list = vec!["bot-detection".into()];

        orchestrator.refresh_ignore_list().await;
        let list = orchestrator.ignore_list();
        assert!(list.is_ignored("acl") && list.is_ignored("bot-detection"));

        control_plane.fail_on("get_ignore_list");
        orchestrator.refresh_ignore_list().await;
        let list = orchestrator.ignore_list();
        assert!(list.is_ignored("acl"));
        assert!(!list.is_ignored("bot-detection"));
    }

    fn consumer_fixture() -> (Arc<FakeGateway>, Arc<FakeControlPlane>, SyncOrchestrator) {
        let (gateway, control_plane, orchestrator) = setup();
        {
            let mut cp = control_plane.state();
            cp.plans.push(plan("basic", 10));
            cp.subscribe("sub-1", "app1", "petstore", Some("basic"), Some("key-1"));
            cp.subscribe("sub-2", "app2", "petstore", None, Some("key-2"));
        }
        {
            let mut state = gateway.state();
            state.add_service_direct("petstore", json!({}));
            state.add_consumer_direct("ops", &[]);
            state.add_consumer_direct("legacy", &["sync-ignore"]);
            state.add_consumer_direct("gone$petstore", &[]);
        }
        (gateway, control_plane, orchestrator)
    }

    #[tokio::test]
    async fn test_consumer_sync_creates_and_removes() {
        let config = SyncConfig {
            ignore_list: vec!["ops".into()],
            ..SyncConfig::default()
        };
        let (gateway, control_plane, _) = consumer_fixture();
        let orchestrator = SyncOrchestrator::new(gateway.clone(), control_plane.clone(), &config);

        orchestrator.sync_all_consumers().await.unwrap();

        let state = gateway.state();
        let mut usernames: Vec<&str> = state.consumers.iter().map(|c| c.username.as_str()).collect();
        usernames.sort();
        assert_eq!(usernames, vec!["app1$petstore", "app2$petstore", "legacy", "ops"]);

        let creds = state.credentials_of("app1$petstore");
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].key, "key-1");

        let consumer_plugins: Vec<&GatewayPlugin> =
            state.plugins.iter().filter(|p| p.consumer.is_some()).collect();
        assert_eq!(consumer_plugins.len(), 1);
        assert_eq!(consumer_plugins[0].fields["config"]["minute"], 10);
    }

    #[tokio::test]
    async fn test_consumer_sync_is_idempotent() {
        let (gateway, _, orchestrator) = consumer_fixture();

        orchestrator.sync_all_consumers().await.unwrap();
        let before = gateway.state().mutations();
        orchestrator.sync_all_consumers().await.unwrap();
        assert_eq!(gateway.state().mutations(), before);
    }

    #[tokio::test]
    async fn test_stale_key_replaced_unless_rotating() {
        let (gateway, control_plane, orchestrator) = setup();
        control_plane
            .state()
            .subscribe("sub-1", "app1", "petstore", None, Some("key-new"));
        {
            let mut state = gateway.state();
            state.add_service_direct("petstore", json!({}));
            state.add_consumer_direct("app1$petstore", &[]);
            state.add_credential_direct("app1$petstore", "key-old", &[]);
        }

        orchestrator.sync_app_consumers("app1").await.unwrap();
        let creds = gateway.state().credentials_of("app1$petstore");
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].key, "key-new");

        gateway
            .state()
            .add_credential_direct("app1$petstore", "key-rotated", &[ROTATE_KEY_TAG]);
        orchestrator.sync_app_consumers("app1").await.unwrap();
        assert_eq!(gateway.state().credentials_of("app1$petstore").len(), 2);
    }

    #[tokio::test]
    async fn test_app_sync_removes_unapproved() {
        let (gateway, control_plane, orchestrator) = setup();
        {
            let mut cp = control_plane.state();
            cp.subscribe("sub-1", "app1", "petstore", None, None);
            cp.subscribe("sub-2", "app1", "weather", None, None);
            cp.subscriptions[1].approved = false;
        }
        {
            let mut state = gateway.state();
            state.add_consumer_direct("app1$weather", &[]);
            state.add_consumer_direct("app2$weather", &[]);
        }

        orchestrator.sync_app_consumers("app1").await.unwrap();

        let state = gateway.state();
        let mut usernames: Vec<&str> = state.consumers.iter().map(|c| c.username.as_str()).collect();
        usernames.sort();
        assert_eq!(usernames, vec!["app1$petstore", "app2$weather"]);
    }

    #[tokio::test]
    async fn test_empty_consumer_sync_is_noop() {
        let (gateway, _, orchestrator) = setup();
        orchestrator.sync_all_consumers().await.unwrap();
        assert_eq!(gateway.state().mutations(), 0);
    }

    #[tokio::test]
    async fn test_delete_absent_consumer_succeeds() {
        let (gateway, _, orchestrator) = setup();
        gateway.state().add_consumer_direct("app1$petstore", &[]);

        orchestrator
            .delete_app_consumers("app1", &["petstore".to_string(), "weather".to_string()])
            .await
            .unwrap();
        orchestrator.delete_subscription_consumer("nobody", "petstore").await.unwrap();
        assert!(gateway.state().consumers.is_empty());
    }

    #[tokio::test]
    async fn test_wipe_keeps_ignored_consumers() {
        let (gateway, _, orchestrator) = setup();
        {
            let mut state = gateway.state();
            state.add_consumer_direct("app1$petstore", &[]);
            state.add_consumer_direct("keeper", &["sync-ignore"]);
        }

        assert_eq!(orchestrator.wipe_all_consumers().await.unwrap(), 1);
        assert_eq!(gateway.state().consumers.len(), 1);
    }
}
