//! Per-API hooks run after a subscription event was acknowledged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use crate::config::HooksConfig;
use crate::http::client::{ClientError, RestClient};

/// Best-effort reaction to a subscription being added or updated.
///
/// Failures are the hook's own business; the processor never sees them.
#[async_trait]
pub trait SubscriptionHook: Send + Sync {
    async fn on_subscription(&self, app_id: &str, api_id: &str);
}

/// Hooks keyed by API id.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn SubscriptionHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ForwardingHook`] per configured entry.
    pub fn from_config(config: &HooksConfig, timeout: Duration, user_agent: &str) -> Result<Self, ClientError> {
        let mut registry = Self::new();
        for hook in &config.forwarding {
            let url = Url::parse(&hook.url).map_err(|e| ClientError::InvalidUrl {
                url: hook.url.clone(),
                reason: e.to_string(),
            })?;
            let client = RestClient::new(&hook.url, timeout, user_agent)?;
            registry.register(&hook.api_id, Arc::new(ForwardingHook::new(client, url)));
        }
        Ok(registry)
    }

    pub fn register(&mut self, api_id: &str, hook: Arc<dyn SubscriptionHook>) {
        self.hooks.insert(api_id.to_string(), hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the hook registered for `api_id`, if any.
    pub async fn notify(&self, app_id: &str, api_id: &str) {
        if let Some(hook) = self.hooks.get(api_id) {
            tracing::debug!(app = %app_id, api = %api_id, "Running subscription hook");
            hook.on_subscription(app_id, api_id).await;
        }
    }
}

/// POSTs `{applicationId, apiId}` to a fixed URL from a detached task.
pub struct ForwardingHook {
    client: RestClient,
    url: Url,
}

impl ForwardingHook {
    pub fn new(client: RestClient, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl SubscriptionHook for ForwardingHook {
    async fn on_subscription(&self, app_id: &str, api_id: &str) {
        let client = self.client.clone();
        let url = self.url.clone();
        let body = json!({ "applicationId": app_id, "apiId": api_id });
        tokio::spawn(async move {
            match client.post_unit(url.clone(), &body).await {
                Ok(()) => tracing::debug!(%url, "Subscription forwarded"),
                Err(error) => tracing::warn!(%url, %error, "Subscription forwarding failed"),
            }
        });
    }
}
