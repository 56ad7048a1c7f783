//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound (server.rs):
//!     webhook notification / ping / admin request
//!     → request.rs (request ID) → TraceLayer → handler → Adapter
//!
//! Outbound (client.rs):
//!     gateway / control-plane client → RestClient (reqwest) → remote API
//! ```

pub mod client;
pub mod request;
pub mod server;

pub use client::{ClientError, RestClient};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
