//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build clients → Bind listener → Await upstreams → Register webhook
//!     listener → Startup change detection → Initial sync → Drain events
//!     → Start watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal or restart → broadcast → server, debouncer and main loop stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Restart (restart.rs):
//!     Manifest change → marker file → signal sibling → exit after grace delay
//! ```
//!
//! # Design Decisions
//! - Only startup steps before the initial sync are fatal
//! - A failed initial sync is logged; the next trigger converges
//! - Restart exits cleanly (status 0) so the supervisor restarts us

pub mod restart;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use restart::{RestartError, RestartSignal};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{run, StartupError};
