//! Gateway adapter library.
//!
//! Reconciles an API gateway's admin configuration with the developer
//! portal's control plane: services and routes per API, consumers per
//! subscription, plugins, and API keys with rotation.

pub mod adapter;
pub mod admin;
pub mod config;
pub mod control_plane;
pub mod events;
pub mod gateway;
pub mod http;
pub mod keys;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sync;
pub mod watcher;

#[cfg(test)]
pub mod testing;

pub use adapter::{Adapter, AdapterStatus, InitOptions};
pub use config::AdapterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
