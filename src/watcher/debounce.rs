//! Debounce loop: a burst of changes yields one decision.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};

use crate::watcher::change_set::{ChangeDecision, ChangeSet};

/// Collect changed paths from `changes` and call `on_fire` once `delay` has
/// passed without a new change.
///
/// Every change restarts the timer. Runs until the channel closes or
/// `shutdown` fires; pending changes are dropped then.
pub async fn debounce_changes<F, Fut>(
    mut changes: mpsc::UnboundedReceiver<PathBuf>,
    delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut on_fire: F,
) where
    F: FnMut(ChangeDecision) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending = ChangeSet::new();
    let timer = sleep(delay);
    tokio::pin!(timer);
    let mut armed = false;

    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Some(path) => {
                    if let Some(name) = pending.record(&path) {
                        tracing::debug!(change = %name, "Change recorded");
                    }
                    timer.as_mut().reset(Instant::now() + delay);
                    armed = true;
                }
                None => break,
            },
            () = &mut timer, if armed => {
                armed = false;
                let decision = pending.take_decision();
                tracing::info!(?decision, "Debounce window closed");
                on_fire(decision).await;
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!(dropped = pending.len(), "Change debouncer stopped");
}
