//! Shared setup for integration tests: the adapter wired to real REST
//! clients that talk to httpmock servers standing in for the gateway and
//! the control plane.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::Router;
use httpmock::{Method, MockServer};
use serde_json::Value;

use gateway_adapter::config::AdapterConfig;
use gateway_adapter::control_plane::ControlPlaneClient;
use gateway_adapter::events::HookRegistry;
use gateway_adapter::gateway::GatewayClient;
use gateway_adapter::{Adapter, HttpServer};

pub const ADMIN_KEY: &str = "integration-key";
pub const LISTENER: &str = "gateway-adapter";

pub struct Harness {
    pub gateway: MockServer,
    pub control_plane: MockServer,
    pub adapter: Arc<Adapter>,
    pub router: Router,
}

impl Harness {
    pub async fn start() -> Self {
        let gateway = MockServer::start_async().await;
        let control_plane = MockServer::start_async().await;

        let mut config = AdapterConfig::default();
        config.gateway.admin_url = gateway.base_url();
        config.control_plane.api_url = control_plane.base_url();
        config.admin.enabled = true;
        config.admin.api_key = ADMIN_KEY.to_string();
        config.sync.prometheus_plugin = false;

        let adapter = Arc::new(Adapter::new(
            Arc::new(GatewayClient::new(&config.gateway, "integration-test").unwrap()),
            Arc::new(ControlPlaneClient::new(&config.control_plane, "integration-test").unwrap()),
            &config,
            HookRegistry::new(),
        ));
        let router = HttpServer::new(adapter.clone(), &config).router();

        Self {
            gateway,
            control_plane,
            adapter,
            router,
        }
    }

    /// Control plane with an empty ignore list.
    pub async fn mock_globals(&self) {
        self.control_plane
            .mock_async(|when, then| {
                when.method(Method::GET).path("/globals");
                then.status(200).json_body(serde_json::json!({"kongAdapter": {"ignoreList": []}}));
            })
            .await;
    }
}

pub fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_KEY}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
