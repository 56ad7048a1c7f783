//! REST client for the control-plane API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ControlPlaneConfig;
use crate::control_plane::types::{
    ApiConfig, ApiList, ApiSummary, ApplicationList, ApplicationSummary, Globals, Plan, PlanList,
    RotatedKey, Subscription, WebhookEvent, WebhookListener,
};
use crate::control_plane::ControlPlane;
use crate::http::client::{ClientError, RestClient};

/// Control-plane client over HTTP.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    rest: RestClient,
}

impl ControlPlaneClient {
    pub fn new(config: &ControlPlaneConfig, user_agent: &str) -> Result<Self, ClientError> {
        let rest = RestClient::new(
            &config.api_url,
            Duration::from_secs(config.timeout_secs),
            user_agent,
        )?
        .with_bearer(config.api_token.clone());
        Ok(Self { rest })
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn ping(&self) -> Result<(), ClientError> {
        let _: Value = self.rest.get(self.rest.endpoint(&["ping"])).await?;
        Ok(())
    }

    async fn list_apis(&self) -> Result<Vec<ApiSummary>, ClientError> {
        let list: ApiList = self.rest.get(self.rest.endpoint(&["apis"])).await?;
        Ok(list.apis)
    }

    async fn get_api_config(&self, api_id: &str) -> Result<ApiConfig, ClientError> {
        self.rest.get(self.rest.endpoint(&["apis", api_id, "config"])).await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, ClientError> {
        let list: PlanList = self.rest.get(self.rest.endpoint(&["plans"])).await?;
        Ok(list.plans)
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationSummary>, ClientError> {
        let list: ApplicationList = self.rest.get(self.rest.endpoint(&["applications"])).await?;
        Ok(list.items)
    }

    async fn list_app_subscriptions(&self, app_id: &str) -> Result<Vec<Subscription>, ClientError> {
        match self
            .rest
            .get(self.rest.endpoint(&["applications", app_id, "subscriptions"]))
            .await
        {
            // Application deleted between listing and fetching.
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    async fn get_ignore_list(&self) -> Result<Vec<String>, ClientError> {
        let globals: Globals = self.rest.get(self.rest.endpoint(&["globals"])).await?;
        Ok(globals.kong_adapter.ignore_list)
    }

    async fn get_webhook_events(&self, listener: &str) -> Result<Vec<WebhookEvent>, ClientError> {
        self.rest
            .get(self.rest.endpoint(&["webhooks", "events", listener]))
            .await
    }

    async fn delete_webhook_event(&self, listener: &str, event_id: &str) -> Result<(), ClientError> {
        self.rest
            .delete(self.rest.endpoint(&["webhooks", "events", listener, event_id]))
            .await
    }

    async fn flush_webhook_events(&self, listener: &str) -> Result<(), ClientError> {
        self.rest
            .delete(self.rest.endpoint(&["webhooks", "events", listener]))
            .await
    }

    async fn upsert_webhook_listener(&self, listener: &WebhookListener) -> Result<(), ClientError> {
        self.rest
            .put_unit(
                self.rest.endpoint(&["webhooks", "listeners", &listener.id]),
                listener,
            )
            .await
    }

    async fn notify_rotated_key(&self, key: &RotatedKey) -> Result<(), ClientError> {
        self.rest
            .post_unit(self.rest.endpoint(&["applications", "update-key"]), key)
            .await
    }
}
