//! Metrics collection and exposition.
//!
//! # Metrics
//! - `adapter_sync_passes_total` (counter): passes by stage and outcome
//! - `adapter_sync_duration_seconds` (histogram): pass latency by stage
//! - `adapter_sync_items_total` (counter): work items by entity kind and operation
//! - `adapter_events_total` (counter): webhook events by entity, action and outcome
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder they are no-ops
//! - The Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::sync::EntityKind;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(error) => tracing::error!(address = %addr, %error, "Failed to install metrics exporter"),
    }
}

/// One finished reconciliation stage (`apis`, `consumers`, `events`, ...).
pub fn record_pass(stage: &'static str, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("adapter_sync_passes_total", "stage" => stage, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("adapter_sync_duration_seconds", "stage" => stage)
        .record(elapsed.as_secs_f64());
}

/// Sizes of an assembled todo list.
pub fn record_todos(kind: EntityKind, add: usize, update: usize, delete: usize) {
    let kind = kind.as_str();
    for (op, count) in [("add", add), ("update", update), ("delete", delete)] {
        if count > 0 {
            metrics::counter!("adapter_sync_items_total", "kind" => kind, "op" => op)
                .increment(count as u64);
        }
    }
}

pub fn record_event(entity: &'static str, action: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!(
        "adapter_events_total",
        "entity" => entity,
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}
