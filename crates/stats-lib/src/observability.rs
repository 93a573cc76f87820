//! Observability infrastructure for the stats pipeline
//!
//! Provides:
//! - Prometheus metrics (cycle duration, host fallbacks, published records)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::collector::HostKind;

/// Cycle duration buckets (in seconds); a cycle is dominated by SSH round trips
const CYCLE_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounterVec,
    hosts_collected: IntCounterVec,
    host_fallbacks: IntCounterVec,
    records_published: IntCounter,
    publish_failures: IntCounter,
    last_success_timestamp: IntGauge,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "edgestats_cycle_duration_seconds",
                "Time spent on one collect-and-publish cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter_vec!(
                "edgestats_cycles_total",
                "Collect-and-publish cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            hosts_collected: register_int_counter_vec!(
                "edgestats_hosts_collected_total",
                "Hosts collected successfully",
                &["kind"]
            )
            .expect("Failed to register hosts_collected_total"),

            host_fallbacks: register_int_counter_vec!(
                "edgestats_host_fallbacks_total",
                "Hosts replaced by their fallback template",
                &["kind"]
            )
            .expect("Failed to register host_fallbacks_total"),

            records_published: register_int_counter!(
                "edgestats_records_published_total",
                "Metric records accepted by the monitoring backend"
            )
            .expect("Failed to register records_published_total"),

            publish_failures: register_int_counter!(
                "edgestats_publish_failures_total",
                "Publish calls rejected by or unable to reach the backend"
            )
            .expect("Failed to register publish_failures_total"),

            last_success_timestamp: register_int_gauge!(
                "edgestats_last_success_timestamp_seconds",
                "Unix time of the last successful cycle"
            )
            .expect("Failed to register last_success_timestamp_seconds"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Count a finished cycle as `success` or `failure`
    pub fn inc_cycle(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().cycles_total.with_label_values(&[outcome]).inc();
        if success {
            self.inner()
                .last_success_timestamp
                .set(chrono::Utc::now().timestamp());
        }
    }

    pub fn inc_host_collected(&self, kind: HostKind) {
        self.inner()
            .hosts_collected
            .with_label_values(&[kind.label()])
            .inc();
    }

    pub fn inc_host_fallback(&self, kind: HostKind) {
        self.inner()
            .host_fallbacks
            .with_label_values(&[kind.label()])
            .inc();
    }

    pub fn add_records_published(&self, count: usize) {
        self.inner().records_published.inc_by(count as u64);
    }

    pub fn inc_publish_failures(&self) {
        self.inner().publish_failures.inc();
    }
}

/// Structured logger for pipeline events
///
/// Emits event-style records that are easy to filter in the JSON log.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            mode = %mode,
            "Edge stats agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Edge stats agent shutting down"
        );
    }

    pub fn log_cycle_started(&self, edge_nodes: usize, clusters: usize) {
        info!(
            event = "cycle_started",
            instance = %self.instance,
            edge_nodes = edge_nodes,
            clusters = clusters,
            "Starting collection cycle"
        );
    }

    /// A host was replaced by its fallback record
    pub fn log_host_fallback(&self, kind: HostKind, host_id: &str, reason: &str) {
        warn!(
            event = "host_fallback",
            instance = %self.instance,
            kind = kind.label(),
            host_id = %host_id,
            reason = %reason,
            "Using fallback stats for host"
        );
    }

    pub fn log_cycle_completed(&self, resources: usize, records: usize, fallbacks: usize) {
        info!(
            event = "cycle_completed",
            instance = %self.instance,
            resources = resources,
            records = records,
            fallbacks = fallbacks,
            "Published collection cycle"
        );
    }

    pub fn log_publish_failed(&self, error: &str) {
        error!(
            event = "publish_failed",
            instance = %self.instance,
            error = %error,
            "Failed to publish metrics"
        );
    }
}
