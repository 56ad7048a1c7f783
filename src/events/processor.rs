//! Serial drain of the control plane's event queue.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::control_plane::{ControlPlane, WebhookEvent};
use crate::events::{EventAction, HookRegistry};
use crate::keys::KeyRotationManager;
use crate::observability::metrics as telemetry;
use crate::sync::{SyncError, SyncOrchestrator, SyncResult};

/// Turns pending webhook events into sync actions.
pub struct EventProcessor {
    control_plane: Arc<dyn ControlPlane>,
    orchestrator: Arc<SyncOrchestrator>,
    keys: KeyRotationManager,
    hooks: HookRegistry,
    listener_id: String,
}

impl EventProcessor {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        orchestrator: Arc<SyncOrchestrator>,
        keys: KeyRotationManager,
        hooks: HookRegistry,
        listener_id: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            orchestrator,
            keys,
            hooks,
            listener_id: listener_id.into(),
        }
    }

    /// Drain the queue until a fetch comes back empty. Returns the number of
    /// events handled.
    ///
    /// Stops at the first failing event; it and everything after it stay queued.
    pub async fn process_webhooks(&self) -> SyncResult<usize> {
        let started = Instant::now();
        let result = self.drain().await;
        telemetry::record_pass("events", result.is_ok(), started.elapsed());
        result
    }

    async fn drain(&self) -> SyncResult<usize> {
        let mut seen = HashSet::new();
        let mut handled = 0;

        loop {
            let events = self
                .control_plane
                .get_webhook_events(&self.listener_id)
                .await
                .map_err(SyncError::fetch("webhook events"))?;
            if events.is_empty() {
                break;
            }
            tracing::debug!(count = events.len(), "Fetched pending events");

            let mut progressed = false;
            for event in &events {
                // Redelivered after a failed acknowledgement; picked up by the next drain.
                if !seen.insert(event.id.clone()) {
                    continue;
                }
                self.handle(event).await?;
                handled += 1;
                progressed = true;
            }
            if !progressed {
                tracing::warn!(
                    pending = events.len(),
                    "Queue only holds events already handled in this drain"
                );
                break;
            }
        }

        if handled > 0 {
            tracing::info!(handled, "Webhook events processed");
        }
        Ok(handled)
    }

    /// Run one event's action, then acknowledge it.
    pub async fn handle(&self, event: &WebhookEvent) -> SyncResult<()> {
        let action = EventAction::from_event(event);
        tracing::info!(event = %event.id, action = action.label(), "Processing event");

        let result = self.execute(&action).await;
        telemetry::record_event(entity_label(event), action.label(), result.is_ok());
        result.map_err(|source| SyncError::Dispatch {
            event_id: event.id.clone(),
            source: Box::new(source),
        })?;

        self.acknowledge(&event.id).await;

        if let EventAction::SyncSubscription { app_id, api_id } = &action {
            self.hooks.notify(app_id, api_id).await;
        }
        Ok(())
    }

    async fn execute(&self, action: &EventAction) -> SyncResult<()> {
        match action {
            EventAction::SyncApplication { app_id } | EventAction::SyncSubscription { app_id, .. } => {
                self.orchestrator.sync_app_consumers(app_id).await
            }
            EventAction::DeleteApplication { app_id, api_ids } => {
                self.orchestrator.delete_app_consumers(app_id, api_ids).await
            }
            EventAction::DeleteSubscription { app_id, api_id } => {
                self.orchestrator.delete_subscription_consumer(app_id, api_id).await
            }
            EventAction::RotateKey { app_id, api_id } => {
                self.keys.issue(app_id, api_id).await?;
                Ok(())
            }
            EventAction::RevokeKey {
                app_id,
                api_id,
                old_key,
            } => Ok(self.keys.revoke(app_id, api_id, old_key).await?),
            EventAction::Discard { reason } => {
                tracing::debug!(reason, "Discarding event");
                Ok(())
            }
        }
    }

    /// A failed acknowledgement only means the event comes back later.
    async fn acknowledge(&self, event_id: &str) {
        if let Err(error) = self
            .control_plane
            .delete_webhook_event(&self.listener_id, event_id)
            .await
        {
            tracing::warn!(event = %event_id, %error, "Failed to acknowledge event");
        }
    }
}

fn entity_label(event: &WebhookEvent) -> &'static str {
    use crate::control_plane::EventEntity;

    match event.entity {
        EventEntity::Application => "application",
        EventEntity::Subscription => "subscription",
        EventEntity::Import => "import",
        EventEntity::Other => "other",
    }
}
