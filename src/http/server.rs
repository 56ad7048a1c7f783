//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: webhook notification, liveness, admin routes
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::adapter::Adapter;
use crate::config::AdapterConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<Adapter>,
    /// Bearer token required on `/admin/*`.
    pub admin_key: Arc<str>,
}

/// HTTP surface of the adapter.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(adapter: Arc<Adapter>, config: &AdapterConfig) -> Self {
        let state = AppState {
            adapter,
            admin_key: Arc::from(config.admin.api_key.as_str()),
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    fn build_router(config: &AdapterConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", post(notify_handler))
            .route("/ping", get(ping_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(crate::admin::setup_admin_router(state));
        }

        router
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Webhook notification from the control plane: acknowledge at once, drain
/// the event queue in the background.
async fn notify_handler(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let request_id = request_id(&headers).to_string();
    tracing::debug!(request_id = %request_id, "Webhook notification received");

    let adapter = state.adapter.clone();
    tokio::spawn(async move {
        match adapter.process_webhooks().await {
            Ok(handled) => tracing::debug!(request_id = %request_id, handled, "Event drain finished"),
            Err(error) => tracing::error!(request_id = %request_id, %error, "Event drain failed"),
        }
    });

    StatusCode::ACCEPTED
}

async fn ping_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.adapter.status();
    Json(json!({
        "name": "gateway-adapter",
        "version": status.version,
        "healthy": true,
        "initialized": status.initialized,
    }))
}
