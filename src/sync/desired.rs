//! Desired consumers, derived from approved subscriptions.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::control_plane::{Plan, PluginConfig, Subscription};
use crate::sync::naming::username;

const KEY_AUTH: &str = "key-auth";

/// The consumer one subscription should produce on the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerDefinition {
    pub username: String,
    /// The subscription id.
    pub custom_id: String,
    pub app_id: String,
    pub api_id: String,
    /// Key credential the consumer must hold, for `key-auth` subscriptions.
    pub api_key: Option<String>,
    /// Consumer-specific plugins on the API's service, from the plan.
    pub plugins: Vec<PluginConfig>,
}

impl ConsumerDefinition {
    /// Body used to create the consumer.
    pub fn body(&self) -> Value {
        json!({ "username": self.username, "custom_id": self.custom_id })
    }
}

/// Build desired consumers from subscriptions; unapproved ones are skipped.
pub fn consumers_from_subscriptions(
    subscriptions: &[Subscription],
    plans: &HashMap<String, Plan>,
) -> Vec<ConsumerDefinition> {
    subscriptions
        .iter()
        .filter(|sub| sub.approved)
        .map(|sub| {
            let plugins = match sub.plan.as_deref() {
                Some(plan_id) => match plans.get(plan_id) {
                    Some(plan) => plan.config.plugins.clone(),
                    None => {
                        tracing::warn!(
                            subscription = %sub.id,
                            plan = %plan_id,
                            "Subscription references an unknown plan"
                        );
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            let api_key = if sub.auth.as_deref() == Some(KEY_AUTH) {
                sub.apikey.clone()
            } else {
                None
            };

            ConsumerDefinition {
                username: username(&sub.application, &sub.api),
                custom_id: sub.id.clone(),
                app_id: sub.application.clone(),
                api_id: sub.api.clone(),
                api_key,
                plugins,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::types::PlanConfig;
    use serde_json::Map;

    fn subscription(id: &str, app: &str, api: &str, approved: bool) -> Subscription {
        Subscription {
            id: id.into(),
            application: app.into(),
            api: api.into(),
            plan: Some("basic".into()),
            auth: Some("key-auth".into()),
            approved,
            apikey: Some(format!("key-{id}")),
        }
    }

    fn plans() -> HashMap<String, Plan> {
        let mut fields = Map::new();
        fields.insert("config".into(), json!({"minute": 100}));
        let plan = Plan {
            id: "basic".into(),
            name: "Basic".into(),
            config: PlanConfig {
                plugins: vec![PluginConfig {
                    name: "rate-limiting".into(),
                    fields,
                }],
            },
        };
        HashMap::from([(plan.id.clone(), plan)])
    }

    #[test]
    fn test_only_approved_subscriptions() {
        let subs = vec![
            subscription("s1", "app", "petstore", true),
            subscription("s2", "app", "orders", false),
        ];
        let consumers = consumers_from_subscriptions(&subs, &plans());
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].username, "app$petstore");
        assert_eq!(consumers[0].custom_id, "s1");
        assert_eq!(consumers[0].api_key.as_deref(), Some("key-s1"));
        assert_eq!(consumers[0].plugins[0].name, "rate-limiting");
    }

    #[test]
    fn test_non_key_auth_has_no_key() {
        let mut sub = subscription("s1", "app", "petstore", true);
        sub.auth = Some("oauth2".into());
        sub.plan = Some("missing".into());
        let consumers = consumers_from_subscriptions(&[sub], &plans());
        assert!(consumers[0].api_key.is_none());
        assert!(consumers[0].plugins.is_empty());
    }
}
