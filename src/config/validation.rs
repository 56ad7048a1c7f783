//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and bind addresses parse
//! - Validate value ranges (timeouts > 0, concurrency >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AdapterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::AdapterConfig;

/// One rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AdapterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_url(&mut errors, "listener.public_url", &config.listener.public_url);
    check_url(&mut errors, "gateway.admin_url", &config.gateway.admin_url);
    check_url(&mut errors, "control_plane.api_url", &config.control_plane.api_url);
    check_url(&mut errors, "restart.sibling_url", &config.restart.sibling_url);

    if config.gateway.timeout_secs == 0 {
        errors.push(ValidationError::new("gateway.timeout_secs", "must be greater than 0"));
    }
    if config.control_plane.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "control_plane.timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.control_plane.listener_id.trim().is_empty() {
        errors.push(ValidationError::new("control_plane.listener_id", "must not be empty"));
    }
    if config.sync.max_concurrency == 0 {
        errors.push(ValidationError::new("sync.max_concurrency", "must be at least 1"));
    }
    if config.watcher.enabled && config.watcher.debounce_ms == 0 {
        errors.push(ValidationError::new("watcher.debounce_ms", "must be greater than 0"));
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set when admin is enabled",
        ));
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    for (i, hook) in config.hooks.forwarding.iter().enumerate() {
        check_url(&mut errors, &format!("hooks.forwarding[{i}].url"), &hook.url);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {e}"))),
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{value}'")));
    }
}
