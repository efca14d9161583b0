// ABOUTME: Prometheus metrics for poll cycles and source failures.
// ABOUTME: Thin wrappers over the metrics facade so call sites stay one line.

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Metric names used throughout roompoll
pub mod names {
    /// Completed poll cycles, labeled by outcome
    pub const POLLS_TOTAL: &str = "roompoll_polls_total";
    /// Poll cycle duration in seconds
    pub const POLL_DURATION_SECONDS: &str = "roompoll_poll_duration_seconds";
    /// Events handed back to clients
    pub const EVENTS_DELIVERED_TOTAL: &str = "roompoll_events_delivered_total";
    /// Suppressed source failures, labeled by source and phase
    pub const SOURCE_FAILURES_TOTAL: &str = "roompoll_source_failures_total";
    /// Events dropped because they arrived after the response was taken
    pub const LATE_EVENTS_TOTAL: &str = "roompoll_late_events_total";
}

/// Install the global Prometheus recorder.
///
/// Must be called at most once per process.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

pub fn record_poll(outcome: &'static str, events: usize, elapsed: Duration) {
    counter!(names::POLLS_TOTAL, "outcome" => outcome).increment(1);
    counter!(names::EVENTS_DELIVERED_TOTAL).increment(events as u64);
    histogram!(names::POLL_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_source_failure(source: &str, phase: &'static str) {
    counter!(
        names::SOURCE_FAILURES_TOTAL,
        "source" => source.to_string(),
        "phase" => phase
    )
    .increment(1);
}

pub fn record_late_events(source: &str, count: usize) {
    counter!(names::LATE_EVENTS_TOTAL, "source" => source.to_string()).increment(count as u64);
}
