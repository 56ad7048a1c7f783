//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the adapter.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway adapter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdapterConfig {
    /// HTTP listener for webhook notifications and admin requests.
    pub listener: ListenerConfig,

    /// Gateway admin API.
    pub gateway: GatewayConfig,

    /// Control-plane API.
    pub control_plane: ControlPlaneConfig,

    /// Reconciliation settings.
    pub sync: SyncConfig,

    /// Configuration-directory watcher.
    pub watcher: WatcherConfig,

    /// Restart protocol used when global manifests change.
    pub restart: RestartConfig,

    /// Per-API subscription hooks.
    pub hooks: HooksConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3002").
    pub bind_address: String,

    /// URL under which the control plane reaches this adapter.
    pub public_url: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3002".to_string(),
            public_url: "http://localhost:3002/".to_string(),
            max_body_size: 1024 * 1024,
        }
    }
}

/// Gateway admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Admin API base URL (e.g., "http://kong:8001").
    pub admin_url: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            admin_url: "http://localhost:8001".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Control-plane API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// API base URL (e.g., "http://portal-api:3001").
    pub api_url: String,

    /// Optional bearer token sent with every request.
    pub api_token: Option<String>,

    /// Webhook listener id this adapter registers and drains.
    pub listener_id: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001".to_string(),
            api_token: None,
            listener_id: "gateway-adapter".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum gateway/control-plane calls in flight during fan-out.
    pub max_concurrency: usize,

    /// Plugin and consumer names never updated or deleted.
    /// Used when the control plane's list cannot be fetched.
    pub ignore_list: Vec<String>,

    /// Consumers carrying this tag are never deleted.
    pub ignore_tag: String,

    /// Keep exactly one global `prometheus` plugin on the gateway.
    pub prometheus_plugin: bool,

    /// How long to wait for both upstreams at startup, in seconds.
    pub upstream_wait_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            ignore_list: Vec::new(),
            ignore_tag: "sync-ignore".to_string(),
            prometheus_plugin: true,
            upstream_wait_secs: 300,
        }
    }
}

/// Configuration-directory watcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,

    /// Root of the static configuration (`apis/`, `plans/`).
    pub root: PathBuf,

    /// Quiet period after the last change before acting, in milliseconds.
    pub debounce_ms: u64,

    /// A root modified this recently is a fresh deployment; no startup sync.
    pub root_fresh_minutes: u64,

    /// Files modified this recently trigger a startup sync.
    pub recent_minutes: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("/var/portal-api/static"),
            debounce_ms: 10_000,
            root_fresh_minutes: 60,
            recent_minutes: 10,
        }
    }
}

/// Restart protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Marker file written before restarting.
    pub marker_path: PathBuf,

    /// Sibling endpoint that restarts the control plane.
    pub sibling_url: String,

    /// Environment variable holding the shared `x-local-key` secret.
    pub local_key_env: String,

    /// Delay before exiting, in seconds.
    pub grace_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            marker_path: PathBuf::from("RELOAD_REQUESTED"),
            sibling_url: "http://localhost:3001/kill".to_string(),
            local_key_env: "PORTAL_LOCAL_KEY".to_string(),
            grace_secs: 3,
        }
    }
}

/// Subscription hooks, keyed by API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HooksConfig {
    pub forwarding: Vec<ForwardingHookConfig>,
}

/// POST `{applicationId, apiId}` to `url` after a subscription to `api_id` changes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardingHookConfig {
    pub api_id: String,
    pub url: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable `/admin/*` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
        }
    }
}
