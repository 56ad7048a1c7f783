//! Configuration directory watching.
//!
//! # Data Flow
//! ```text
//! filesystem events (notify, recursive)
//!     → ChangeWatcher (changed paths over an mpsc channel)
//!     → debounce.rs (quiet period, one decision per burst)
//!     → change_set.rs (restart vs. scoped API resync)
//!     → adapter (resync_apis) / lifecycle::restart
//! ```
//!
//! detect.rs covers the same layout once at startup, from modification times.

pub mod change_set;
pub mod debounce;
pub mod detect;

use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

pub use change_set::{ChangeDecision, ChangeSet};
pub use debounce::debounce_changes;
pub use detect::{detect_changed_apis, DetectedChanges};

/// Forwards every changed path below `root`.
pub struct ChangeWatcher {
    root: PathBuf,
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl ChangeWatcher {
    /// Returns the watcher and the receiving end for changed paths.
    pub fn new(root: &Path) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                root: root.to_path_buf(),
                tx,
            },
            rx,
        )
    }

    /// Start watching. Events stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                // One broken path does not stop the others.
                Err(error) => tracing::error!(%error, "Watch error"),
            },
            Config::default(),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        tracing::info!(root = %self.root.display(), "Watching configuration directory");
        Ok(watcher)
    }
}
