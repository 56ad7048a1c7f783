//! Restart protocol for changed global manifests.
//!
//! A restart writes a marker file, asks the sibling control-plane process to
//! restart (authenticated with the shared `x-local-key` secret), then lets the
//! caller exit after the grace delay.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::RestartConfig;

pub const LOCAL_KEY_HEADER: &str = "x-local-key";

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("invalid sibling URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to write restart marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to signal sibling at {url}: {source}")]
    Sibling {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("sibling at {url} answered {status}")]
    SiblingStatus { url: String, status: StatusCode },
}

pub struct RestartSignal {
    http: reqwest::Client,
    marker_path: PathBuf,
    sibling_url: Url,
    local_key: Option<String>,
    grace: Duration,
}

impl RestartSignal {
    /// The shared secret is read from `config.local_key_env` once, here.
    pub fn from_config(config: &RestartConfig, timeout: Duration) -> Result<Self, RestartError> {
        let sibling_url = Url::parse(&config.sibling_url).map_err(|source| RestartError::InvalidUrl {
            url: config.sibling_url.clone(),
            source,
        })?;
        let local_key = std::env::var(&config.local_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if local_key.is_none() {
            tracing::warn!(env = %config.local_key_env, "No local key set, sibling restart request is unauthenticated");
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| RestartError::Sibling {
                url: sibling_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            marker_path: config.marker_path.clone(),
            sibling_url,
            local_key,
            grace: Duration::from_secs(config.grace_secs),
        })
    }

    pub fn with_local_key(mut self, key: Option<String>) -> Self {
        self.local_key = key;
        self
    }

    /// Delay between signalling the sibling and exiting.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Write the marker and signal the sibling.
    pub async fn request(&self) -> Result<(), RestartError> {
        self.write_marker().await?;
        self.signal_sibling().await?;
        tracing::warn!(grace_secs = self.grace.as_secs(), "Restart requested");
        Ok(())
    }

    async fn write_marker(&self) -> Result<(), RestartError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        tokio::fs::write(&self.marker_path, format!("restart requested at {now}\n"))
            .await
            .map_err(|source| RestartError::Marker {
                path: self.marker_path.clone(),
                source,
            })
    }

    async fn signal_sibling(&self) -> Result<(), RestartError> {
        let mut request = self.http.post(self.sibling_url.clone());
        if let Some(key) = &self.local_key {
            request = request.header(LOCAL_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|source| RestartError::Sibling {
            url: self.sibling_url.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RestartError::SiblingStatus {
                url: self.sibling_url.to_string(),
                status,
            });
        }
        Ok(())
    }
}
