//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, from --config or GATEWAY_ADAPTER_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AdapterConfig (validated, immutable)
//!     → handed to the clients, the adapter and the HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, CONFIG_ENV};
pub use schema::{
    AdapterConfig, AdminConfig, ControlPlaneConfig, ForwardingHookConfig, GatewayConfig,
    HooksConfig, ListenerConfig, ObservabilityConfig, RestartConfig, SyncConfig, WatcherConfig,
};
