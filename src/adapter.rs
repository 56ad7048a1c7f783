//! The adapter: one entry point for every trigger source.
//!
//! Passes (init, resync, event drains) are serialized behind a single lock.
//! A trigger arriving during a pass waits for it; webhook notifications that
//! arrive while a drain is already waiting are folded into that drain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{AdapterConfig, SyncConfig};
use crate::control_plane::{ControlPlane, WebhookListener};
use crate::events::{EventProcessor, HookRegistry};
use crate::gateway::GatewayAdmin;
use crate::keys::KeyRotationManager;
use crate::sync::{SyncError, SyncOrchestrator, SyncResult};

/// What an init or resync pass covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitOptions {
    pub sync_apis: bool,
    pub sync_consumers: bool,
    /// Restrict API updates to these ids; all APIs when absent.
    pub apis: Option<HashSet<String>>,
}

impl InitOptions {
    pub fn full() -> Self {
        Self {
            sync_apis: true,
            sync_consumers: true,
            apis: None,
        }
    }
}

/// Counters reported by the admin status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdapterStatus {
    pub version: &'static str,
    pub initialized: bool,
    pub passes_ok: u64,
    pub passes_failed: u64,
    pub events_processed: u64,
    pub last_success_unix: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Stats {
    initialized: AtomicBool,
    passes_ok: AtomicU64,
    passes_failed: AtomicU64,
    events_processed: AtomicU64,
    last_success_unix: AtomicU64,
    last_error: StdMutex<Option<String>>,
}

impl Stats {
    fn record<T>(&self, result: &SyncResult<T>) {
        match result {
            Ok(_) => {
                self.passes_ok.fetch_add(1, Ordering::Relaxed);
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                self.last_success_unix.store(now, Ordering::Relaxed);
            }
            Err(error) => {
                self.passes_failed.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut last) = self.last_error.lock() {
                    *last = Some(error.to_string());
                }
            }
        }
    }
}

pub struct Adapter {
    orchestrator: Arc<SyncOrchestrator>,
    events: EventProcessor,
    control_plane: Arc<dyn ControlPlane>,
    listener: WebhookListener,
    prometheus_plugin: bool,
    pass_lock: Mutex<()>,
    drain_queued: AtomicBool,
    stats: Stats,
}

impl Adapter {
    pub fn new(
        gateway: Arc<dyn GatewayAdmin>,
        control_plane: Arc<dyn ControlPlane>,
        config: &AdapterConfig,
        hooks: HookRegistry,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            gateway.clone(),
            control_plane.clone(),
            &config.sync,
        ));
        let keys = KeyRotationManager::new(gateway, control_plane.clone());
        let events = EventProcessor::new(
            control_plane.clone(),
            orchestrator.clone(),
            keys,
            hooks,
            config.control_plane.listener_id.clone(),
        );

        Self {
            orchestrator,
            events,
            control_plane,
            listener: WebhookListener {
                id: config.control_plane.listener_id.clone(),
                url: config.listener.public_url.clone(),
            },
            prometheus_plugin: config.sync.prometheus_plugin,
            pass_lock: Mutex::new(()),
            drain_queued: AtomicBool::new(false),
            stats: Stats::default(),
        }
    }

    /// Same as [`new`](Self::new) with only the sync settings taken into account.
    pub fn with_sync_config(
        gateway: Arc<dyn GatewayAdmin>,
        control_plane: Arc<dyn ControlPlane>,
        sync: SyncConfig,
    ) -> Self {
        let config = AdapterConfig {
            sync,
            ..AdapterConfig::default()
        };
        Self::new(gateway, control_plane, &config, HookRegistry::new())
    }

    /// Register this adapter as the control plane's webhook listener.
    pub async fn register_listener(&self) -> SyncResult<()> {
        self.control_plane
            .upsert_webhook_listener(&self.listener)
            .await
            .map_err(SyncError::Listener)?;
        tracing::info!(listener = %self.listener.id, url = %self.listener.url, "Webhook listener registered");
        Ok(())
    }

    /// Refresh the ignore list and cache, then run the requested passes.
    ///
    /// Pending events are flushed before a full consumer sync, which covers them.
    pub async fn init(&self, options: &InitOptions) -> SyncResult<()> {
        let _pass = self.pass_lock.lock().await;
        tracing::info!(
            sync_apis = options.sync_apis,
            sync_consumers = options.sync_consumers,
            restricted_to = options.apis.as_ref().map(|a| a.len()),
            "Init pass started"
        );
        let result = self.run_init(options).await;
        self.stats.record(&result);
        if result.is_ok() {
            self.stats.initialized.store(true, Ordering::Relaxed);
        }
        result
    }

    async fn run_init(&self, options: &InitOptions) -> SyncResult<()> {
        self.orchestrator.invalidate_cache();
        self.orchestrator.refresh_ignore_list().await;

        if options.sync_apis {
            self.orchestrator.sync_apis(options.apis.as_ref()).await?;
        }
        if options.sync_consumers {
            self.control_plane
                .flush_webhook_events(&self.listener.id)
                .await
                .map_err(SyncError::fetch("webhook event flush"))?;
            self.orchestrator.sync_all_consumers().await?;
        }
        if self.prometheus_plugin {
            match self.orchestrator.ensure_prometheus_plugin().await {
                Err(SyncError::Conflict(reason)) => {
                    tracing::error!(%reason, "Global metrics plugin left as is");
                }
                other => other?,
            }
        }
        Ok(())
    }

    pub async fn resync(&self, options: &InitOptions) -> SyncResult<()> {
        self.init(options).await
    }

    /// API-only resync limited to `api_ids`.
    pub async fn resync_apis(&self, api_ids: HashSet<String>) -> SyncResult<()> {
        self.init(&InitOptions {
            sync_apis: true,
            sync_consumers: false,
            apis: Some(api_ids),
        })
        .await
    }

    /// Drain pending webhook events.
    ///
    /// Returns `Ok(0)` without waiting when another drain is already queued
    /// behind the running pass; that drain will see the new events.
    pub async fn process_webhooks(&self) -> SyncResult<usize> {
        if self.drain_queued.swap(true, Ordering::AcqRel) {
            tracing::debug!("Event drain already queued");
            return Ok(0);
        }
        let _pass = self.pass_lock.lock().await;
        self.drain_queued.store(false, Ordering::Release);

        let result = self.events.process_webhooks().await;
        if let Ok(handled) = &result {
            self.stats
                .events_processed
                .fetch_add(*handled as u64, Ordering::Relaxed);
        }
        self.stats.record(&result);
        result
    }

    /// Delete every gateway consumer not protected by the ignore list.
    pub async fn wipe_consumers(&self) -> SyncResult<usize> {
        let _pass = self.pass_lock.lock().await;
        self.orchestrator.refresh_ignore_list().await;
        let result = self.orchestrator.wipe_all_consumers().await;
        self.stats.record(&result);
        result
    }

    pub fn status(&self) -> AdapterStatus {
        let last_success = self.stats.last_success_unix.load(Ordering::Relaxed);
        AdapterStatus {
            version: env!("CARGO_PKG_VERSION"),
            initialized: self.stats.initialized.load(Ordering::Relaxed),
            passes_ok: self.stats.passes_ok.load(Ordering::Relaxed),
            passes_failed: self.stats.passes_failed.load(Ordering::Relaxed),
            events_processed: self.stats.events_processed.load(Ordering::Relaxed),
            last_success_unix: (last_success > 0).then_some(last_success),
            last_error: self.stats.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }
}
