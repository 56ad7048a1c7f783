//! Retry pacing for waiting on upstreams.
//!
//! Sync passes themselves are never retried; the next trigger converges.

pub mod backoff;

pub use backoff::Backoff;
