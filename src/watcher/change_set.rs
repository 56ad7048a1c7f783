//! Accumulated file changes and what they call for.

use std::collections::{BTreeSet, HashSet};
use std::mem;
use std::path::Path;

/// Manifests whose change needs a restart of the sibling API process.
const RESTART_MANIFESTS: [&str; 2] = ["apis.json", "plans.json"];

/// Per-API definition file; a change is recorded under its folder (the API id).
const API_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    Restart,
    /// Resync only these APIs.
    Resync(HashSet<String>),
    Nothing,
}

/// Names of changed files since the last firing.
#[derive(Debug, Default)]
pub struct ChangeSet {
    names: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a changed path; returns the name it was recorded under.
    pub fn record(&mut self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let name = if file_name == API_CONFIG_FILE {
            path.parent()?.file_name()?.to_str()?
        } else {
            file_name
        };
        self.names.insert(name.to_string());
        Some(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Decide on the recorded changes and start over.
    pub fn take_decision(&mut self) -> ChangeDecision {
        let names = mem::take(&mut self.names);
        if names.is_empty() {
            ChangeDecision::Nothing
        } else if names.iter().any(|n| RESTART_MANIFESTS.contains(&n.as_str())) {
            ChangeDecision::Restart
        } else {
            ChangeDecision::Resync(names.into_iter().collect())
        }
    }
}
