//! REST client for the gateway admin API.
//!
//! # Responsibilities
//! - Typed CRUD for services, routes, plugins, consumers and key credentials
//! - Follow paged collections transparently
//! - Report absence (404) as `None` where callers need to tell the difference

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::gateway::types::{
    GatewayConsumer, GatewayPlugin, GatewayRoute, GatewayService, KeyCredential, PluginScope,
};
use crate::gateway::GatewayAdmin;
use crate::http::client::{ClientError, RestClient};

/// Gateway admin client over HTTP.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    rest: RestClient,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, user_agent: &str) -> Result<Self, ClientError> {
        let rest = RestClient::new(
            &config.admin_url,
            Duration::from_secs(config.timeout_secs),
            user_agent,
        )?;
        Ok(Self { rest })
    }
}

#[async_trait]
impl GatewayAdmin for GatewayClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let _: Value = self.rest.get(self.rest.endpoint(&["status"])).await?;
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<GatewayService>, ClientError> {
        self.rest.get_paged(self.rest.endpoint(&["services"])).await
    }

    async fn add_service(&self, body: &Value) -> Result<GatewayService, ClientError> {
        self.rest.post(self.rest.endpoint(&["services"]), body).await
    }

    async fn update_service(&self, id: &str, body: &Value) -> Result<GatewayService, ClientError> {
        self.rest.patch(self.rest.endpoint(&["services", id]), body).await
    }

    async fn delete_service(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(self.rest.endpoint(&["services", id])).await
    }

    async fn list_routes(&self, service: &str) -> Result<Vec<GatewayRoute>, ClientError> {
        self.rest
            .get_paged(self.rest.endpoint(&["services", service, "routes"]))
            .await
    }

    async fn add_route(&self, service: &str, body: &Value) -> Result<GatewayRoute, ClientError> {
        self.rest
            .post(self.rest.endpoint(&["services", service, "routes"]), body)
            .await
    }

    async fn update_route(&self, id: &str, body: &Value) -> Result<GatewayRoute, ClientError> {
        self.rest.patch(self.rest.endpoint(&["routes", id]), body).await
    }

    async fn delete_route(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(self.rest.endpoint(&["routes", id])).await
    }

    async fn list_service_plugins(&self, service_id: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        let mut plugins: Vec<GatewayPlugin> = self
            .rest
            .get_paged(self.rest.endpoint(&["services", service_id, "plugins"]))
            .await?;

        // Plugins added on a route are not listed under the service.
        let routes: Vec<GatewayRoute> = self
            .rest
            .get_paged(self.rest.endpoint(&["services", service_id, "routes"]))
            .await?;
        for route in routes {
            let on_route: Vec<GatewayPlugin> = self
                .rest
                .get_paged(self.rest.endpoint(&["routes", &route.id, "plugins"]))
                .await?;
            for plugin in on_route {
                if !plugins.iter().any(|p| p.id == plugin.id) {
                    plugins.push(plugin);
                }
            }
        }

        // Consumer-specific plugins on this service belong to consumer sync.
        Ok(plugins.into_iter().filter(|p| p.consumer.is_none()).collect())
    }

    async fn list_plugins_by_name(&self, name: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        self.rest
            .get_paged(self.rest.endpoint_with_query(&["plugins"], &[("name", name)]))
            .await
    }

    async fn add_plugin(&self, scope: &PluginScope, body: &Value) -> Result<GatewayPlugin, ClientError> {
        match scope {
            PluginScope::Global => self.rest.post(self.rest.endpoint(&["plugins"]), body).await,
            PluginScope::Service(service) => {
                self.rest
                    .post(self.rest.endpoint(&["services", service, "plugins"]), body)
                    .await
            }
            PluginScope::Route(route_id) => {
                self.rest
                    .post(self.rest.endpoint(&["routes", route_id, "plugins"]), body)
                    .await
            }
            PluginScope::ConsumerOnService { consumer_id, service } => {
                let mut scoped = body.clone();
                if let Value::Object(map) = &mut scoped {
                    map.insert("consumer".to_string(), json!({ "id": consumer_id }));
                }
                self.rest
                    .post(self.rest.endpoint(&["services", service, "plugins"]), &scoped)
                    .await
            }
        }
    }

    async fn update_plugin(&self, id: &str, body: &Value) -> Result<GatewayPlugin, ClientError> {
        self.rest.patch(self.rest.endpoint(&["plugins", id]), body).await
    }

    async fn delete_plugin(&self, id: &str) -> Result<(), ClientError> {
        self.rest.delete(self.rest.endpoint(&["plugins", id])).await
    }

    async fn list_consumers(&self) -> Result<Vec<GatewayConsumer>, ClientError> {
        self.rest.get_paged(self.rest.endpoint(&["consumers"])).await
    }

    async fn get_consumer(&self, username: &str) -> Result<Option<GatewayConsumer>, ClientError> {
        self.rest
            .get_optional(self.rest.endpoint(&["consumers", username]))
            .await
    }

    async fn add_consumer(&self, body: &Value) -> Result<GatewayConsumer, ClientError> {
        self.rest.post(self.rest.endpoint(&["consumers"]), body).await
    }

    async fn update_consumer(&self, id: &str, body: &Value) -> Result<GatewayConsumer, ClientError> {
        self.rest.patch(self.rest.endpoint(&["consumers", id]), body).await
    }

    async fn delete_consumer(&self, username_or_id: &str) -> Result<(), ClientError> {
        self.rest
            .delete(self.rest.endpoint(&["consumers", username_or_id]))
            .await
    }

    async fn list_consumer_plugins(&self, consumer_id: &str) -> Result<Vec<GatewayPlugin>, ClientError> {
        self.rest
            .get_paged(self.rest.endpoint(&["consumers", consumer_id, "plugins"]))
            .await
    }

    async fn list_key_credentials(&self, username: &str) -> Result<Vec<KeyCredential>, ClientError> {
        self.rest
            .get_paged(self.rest.endpoint(&["consumers", username, "key-auth"]))
            .await
    }

    async fn add_key_credential(
        &self,
        username: &str,
        key: Option<&str>,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError> {
        let mut body = json!({ "tags": tags });
        if let Some(key) = key {
            body["key"] = json!(key);
        }
        self.rest
            .post(self.rest.endpoint(&["consumers", username, "key-auth"]), &body)
            .await
    }

    async fn update_key_credential_tags(
        &self,
        username: &str,
        id: &str,
        tags: &[String],
    ) -> Result<KeyCredential, ClientError> {
        self.rest
            .patch(
                self.rest.endpoint(&["consumers", username, "key-auth", id]),
                &json!({ "tags": tags }),
            )
            .await
    }

    async fn delete_key_credential(&self, username: &str, id_or_key: &str) -> Result<(), ClientError> {
        self.rest
            .delete(self.rest.endpoint(&["consumers", username, "key-auth", id_or_key]))
            .await
    }
}
