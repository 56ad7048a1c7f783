//! Issue and revoke key credentials.

use std::sync::Arc;

use crate::control_plane::{ControlPlane, RotatedKey};
use crate::gateway::{GatewayAdmin, GatewayConsumer};
use crate::keys::{CredentialError, ROTATE_KEY_TAG};
use crate::sync::naming::username;

/// Two-phase key rotation against the gateway.
#[derive(Clone)]
pub struct KeyRotationManager {
    gateway: Arc<dyn GatewayAdmin>,
    control_plane: Arc<dyn ControlPlane>,
}

impl KeyRotationManager {
    pub fn new(gateway: Arc<dyn GatewayAdmin>, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            gateway,
            control_plane,
        }
    }

    async fn resolve(&self, app_id: &str, api_id: &str) -> Result<GatewayConsumer, CredentialError> {
        let username = username(app_id, api_id);
        self.gateway
            .get_consumer(&username)
            .await?
            .ok_or(CredentialError::ConsumerNotFound { username })
    }

    /// Create a second key for the subscription's consumer and report it to
    /// the control plane.
    ///
    /// The notification runs detached; its failure is only logged.
    pub async fn issue(&self, app_id: &str, api_id: &str) -> Result<RotatedKey, CredentialError> {
        let consumer = self.resolve(app_id, api_id).await?;
        let credential = self
            .gateway
            .add_key_credential(&consumer.username, None, &[ROTATE_KEY_TAG.to_string()])
            .await?;

        tracing::info!(
            consumer = %consumer.username,
            credential = %credential.id,
            "Issued rotated key"
        );

        let rotated = RotatedKey {
            new_api_key: credential.key,
            api_id: api_id.to_string(),
            application_id: app_id.to_string(),
        };

        let control_plane = self.control_plane.clone();
        let notice = rotated.clone();
        tokio::spawn(async move {
            match control_plane.notify_rotated_key(&notice).await {
                Ok(()) => tracing::debug!(
                    application = %notice.application_id,
                    api = %notice.api_id,
                    "Control plane notified of rotated key"
                ),
                Err(error) => tracing::warn!(
                    application = %notice.application_id,
                    api = %notice.api_id,
                    %error,
                    "Failed to notify control plane of rotated key"
                ),
            }
        });

        Ok(rotated)
    }

    /// Promote the rotated key, then delete `old_key` (credential id or key value).
    ///
    /// An old credential that is already gone counts as revoked.
    pub async fn revoke(&self, app_id: &str, api_id: &str, old_key: &str) -> Result<(), CredentialError> {
        let consumer = self.resolve(app_id, api_id).await?;
        let credentials = self.gateway.list_key_credentials(&consumer.username).await?;

        for credential in credentials.iter().filter(|c| c.has_tag(ROTATE_KEY_TAG)) {
            self.gateway
                .update_key_credential_tags(
                    &consumer.username,
                    &credential.id,
                    &credential.tags_without(ROTATE_KEY_TAG),
                )
                .await?;
        }

        match self.gateway.delete_key_credential(&consumer.username, old_key).await {
            Ok(()) => {
                tracing::info!(consumer = %consumer.username, "Revoked old key");
                Ok(())
            }
            Err(error) if error.is_not_found() => {
                tracing::debug!(consumer = %consumer.username, "Old key already revoked");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
