//! Startup detection of definitions changed while the adapter was down.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::WatcherConfig;

/// What the initial sync should cover.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetectedChanges {
    /// The root itself is new: a fresh deployment, nothing to resync.
    pub fresh_deployment: bool,
    pub sync_consumers: bool,
    pub api_ids: HashSet<String>,
}

impl DetectedChanges {
    pub fn is_empty(&self) -> bool {
        !self.sync_consumers && self.api_ids.is_empty()
    }
}

/// `None` when the path has no readable modification time.
fn modified_within(path: &Path, window: Duration, now: SystemTime) -> Option<bool> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    // A timestamp in the future counts as recent.
    Some(now.duration_since(modified).map_or(true, |age| age <= window))
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Inspect `<root>/plans/plans.json` and `<root>/apis/<id>/config.json`
/// modification times relative to `now`.
pub fn detect_changed_apis(config: &WatcherConfig, now: SystemTime) -> DetectedChanges {
    let root = config.root.as_path();
    let mut detected = DetectedChanges::default();

    if modified_within(root, minutes(config.root_fresh_minutes), now) == Some(true) {
        tracing::info!(root = %root.display(), "Configuration root is fresh, skipping startup resync");
        detected.fresh_deployment = true;
        return detected;
    }

    let recent = minutes(config.recent_minutes);
    let plans = root.join("plans").join("plans.json");
    detected.sync_consumers = modified_within(&plans, recent, now) == Some(true);

    let apis = root.join("apis");
    match fs::read_dir(&apis) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let config_path = entry.path().join("config.json");
                if modified_within(&config_path, recent, now) == Some(true) {
                    if let Some(id) = entry.file_name().to_str() {
                        detected.api_ids.insert(id.to_string());
                    }
                }
            }
        }
        Err(error) => tracing::debug!(path = %apis.display(), %error, "No API definitions to inspect"),
    }

    tracing::info!(
        sync_consumers = detected.sync_consumers,
        apis = detected.api_ids.len(),
        "Startup change detection finished"
    );
    detected
}
