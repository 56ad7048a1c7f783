//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the gateway and control-plane clients
//! - Bind the listener early so notifications are not refused while waiting
//! - Wait for both upstreams, register the webhook listener
//! - Run the initial sync scoped by startup change detection
//! - Start the change watcher and run until shutdown
//!
//! # Design Decisions
//! - Fail fast up to listener registration; later failures are logged
//! - The watcher starts only after the initial sync

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::adapter::{Adapter, InitOptions};
use crate::config::AdapterConfig;
use crate::control_plane::{ControlPlane, ControlPlaneClient};
use crate::events::HookRegistry;
use crate::gateway::{GatewayAdmin, GatewayClient};
use crate::http::client::ClientError;
use crate::http::HttpServer;
use crate::lifecycle::restart::{RestartError, RestartSignal};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::resilience::Backoff;
use crate::sync::SyncError;
use crate::watcher::{debounce_changes, detect_changed_apis, ChangeDecision, ChangeWatcher};

pub const USER_AGENT: &str = concat!("gateway-adapter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create {what} client: {source}")]
    Client {
        what: &'static str,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Restart(#[from] RestartError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{service} did not become available within {waited_secs}s")]
    Upstream { service: &'static str, waited_secs: u64 },

    #[error("failed to register webhook listener: {0}")]
    Listener(#[source] SyncError),

    #[error("failed to watch {root}: {source}")]
    Watch {
        root: String,
        #[source]
        source: notify::Error,
    },
}

/// Ping `service` until it answers or `wait` has passed.
pub async fn await_upstream<F, Fut>(
    service: &'static str,
    wait: Duration,
    mut backoff: Backoff,
    mut ping: F,
) -> Result<(), StartupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ClientError>>,
{
    let started = Instant::now();
    loop {
        match ping().await {
            Ok(()) => {
                tracing::info!(service, attempts = backoff.attempt() + 1, "Upstream available");
                return Ok(());
            }
            Err(error) => {
                let delay = backoff.next_delay();
                if started.elapsed() + delay > wait {
                    return Err(StartupError::Upstream {
                        service,
                        waited_secs: wait.as_secs(),
                    });
                }
                tracing::info!(service, %error, retry_in_ms = delay.as_millis() as u64, "Waiting for upstream");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn upstream_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(500), Duration::from_secs(10))
}

/// Run the adapter until a termination signal or a restart.
pub async fn run(config: AdapterConfig, watch: bool) -> Result<(), StartupError> {
    let gateway: Arc<dyn GatewayAdmin> = Arc::new(
        GatewayClient::new(&config.gateway, USER_AGENT)
            .map_err(|source| StartupError::Client { what: "gateway", source })?,
    );
    let control_plane: Arc<dyn ControlPlane> = Arc::new(
        ControlPlaneClient::new(&config.control_plane, USER_AGENT)
            .map_err(|source| StartupError::Client { what: "control plane", source })?,
    );
    let hooks = HookRegistry::from_config(
        &config.hooks,
        Duration::from_secs(config.control_plane.timeout_secs),
        USER_AGENT,
    )
    .map_err(|source| StartupError::Client { what: "hook", source })?;
    let restart = RestartSignal::from_config(
        &config.restart,
        Duration::from_secs(config.control_plane.timeout_secs),
    )?;

    let adapter = Arc::new(Adapter::new(gateway.clone(), control_plane.clone(), &config, hooks));
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;
    let server = HttpServer::new(adapter.clone(), &config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let wait = Duration::from_secs(config.sync.upstream_wait_secs);
    tokio::try_join!(
        await_upstream("control plane", wait, upstream_backoff(), || control_plane.ping()),
        await_upstream("gateway", wait, upstream_backoff(), || gateway.ping()),
    )?;

    adapter.register_listener().await.map_err(StartupError::Listener)?;

    initial_sync(&adapter, &config).await;

    // Keep the watcher alive for the lifetime of `run`.
    let _watcher = if watch && config.watcher.enabled {
        let (watcher, changes) = ChangeWatcher::new(&config.watcher.root);
        let watcher = watcher.run().map_err(|source| StartupError::Watch {
            root: config.watcher.root.display().to_string(),
            source,
        })?;

        let adapter = adapter.clone();
        let restart = Arc::new(restart);
        let trigger = shutdown.clone();
        tokio::spawn(debounce_changes(
            changes,
            Duration::from_millis(config.watcher.debounce_ms),
            shutdown.subscribe(),
            move |decision| {
                let adapter = adapter.clone();
                let restart = restart.clone();
                let trigger = trigger.clone();
                async move { on_change(decision, &adapter, &restart, &trigger).await }
            },
        ));
        Some(watcher)
    } else {
        tracing::info!("Change watcher disabled");
        None
    };

    tracing::info!("Gateway adapter initialization done");

    let mut stopped = shutdown.subscribe();
    tokio::select! {
        () = wait_for_signal() => shutdown.trigger(),
        _ = stopped.recv() => {}
    }

    match server_task.await {
        Ok(Err(error)) => tracing::error!(%error, "HTTP server failed"),
        Err(error) => tracing::error!(%error, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initial sync scoped by what changed on disk while we were down, then
/// drain whatever events are still queued.
async fn initial_sync(adapter: &Adapter, config: &AdapterConfig) {
    let options = if config.watcher.enabled {
        let detected = detect_changed_apis(&config.watcher, SystemTime::now());
        InitOptions {
            sync_apis: !detected.api_ids.is_empty(),
            sync_consumers: detected.sync_consumers,
            apis: Some(detected.api_ids),
        }
    } else {
        InitOptions::full()
    };

    if let Err(error) = adapter.init(&options).await {
        tracing::error!(%error, "Initial sync failed");
    }
    match adapter.process_webhooks().await {
        Ok(handled) => tracing::info!(handled, "Startup event drain finished"),
        Err(error) => tracing::error!(%error, "Startup event drain failed"),
    }
}

async fn on_change(decision: ChangeDecision, adapter: &Adapter, restart: &RestartSignal, shutdown: &Shutdown) {
    match decision {
        ChangeDecision::Restart => {
            if let Err(error) = restart.request().await {
                tracing::error!(%error, "Restart signalling failed, exiting anyway");
            }
            tokio::time::sleep(restart.grace()).await;
            shutdown.trigger();
        }
        ChangeDecision::Resync(api_ids) => {
            tracing::info!(apis = ?api_ids, "Resyncing changed APIs");
            if let Err(error) = adapter.resync_apis(api_ids).await {
                tracing::error!(%error, "Scoped resync failed");
            }
        }
        ChangeDecision::Nothing => {}
    }
}
