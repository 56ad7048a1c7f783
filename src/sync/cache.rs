//! Memoized desired state, scoped to one orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::control_plane::{ApiDefinition, Plan};

/// Desired APIs and plans, cached until the next resync trigger.
#[derive(Debug, Default)]
pub struct ApiCache {
    apis: ArcSwapOption<Vec<ApiDefinition>>,
    plans: ArcSwapOption<HashMap<String, Plan>>,
}

impl ApiCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apis(&self) -> Option<Arc<Vec<ApiDefinition>>> {
        self.apis.load_full()
    }

    pub fn store_apis(&self, apis: Vec<ApiDefinition>) -> Arc<Vec<ApiDefinition>> {
        let apis = Arc::new(apis);
        self.apis.store(Some(apis.clone()));
        apis
    }

    pub fn plans(&self) -> Option<Arc<HashMap<String, Plan>>> {
        self.plans.load_full()
    }

    pub fn store_plans(&self, plans: HashMap<String, Plan>) -> Arc<HashMap<String, Plan>> {
        let plans = Arc::new(plans);
        self.plans.store(Some(plans.clone()));
        plans
    }

    pub fn invalidate(&self) {
        self.apis.store(None);
        self.plans.store(None);
        tracing::debug!("Desired-state cache invalidated");
    }
}
