//! Metric flattening and key building
//!
//! Converts merged statistics into `|`-delimited metric records. Only
//! strictly positive readings are emitted; a zero is indistinguishable from
//! "nothing happened" on the monitoring side.
//!
//! Within one edge node the order is CPU, then flow cache, then interfaces.
//! Within a host, plain NICs come first and the EnsNetWorld group last.

use crate::aggregate::ClusterAggregate;
use crate::models::{
    AggregatedNicStats, ClusterStats, Direction, EdgeNodeStats, MetricRecord, NicEntry, NicStats,
    ThreadMap,
};

/// Root of every metric key
pub const KEY_ROOT: &str = "EdgePerformanceMetrics";

/// Default `used` percentage at which a thread counts as overloaded
pub const DEFAULT_USAGE_ALERT_THRESHOLD: f64 = 85.0;

const ENS_LABEL: &str = "EnsNetWorld";

fn key(parts: &[&str]) -> String {
    let mut key = String::from(KEY_ROOT);
    for part in parts {
        key.push('|');
        key.push_str(part);
    }
    key
}

/// Accumulates records for one timestamp, dropping non-positive values
struct RecordSink {
    timestamp: i64,
    records: Vec<MetricRecord>,
}

impl RecordSink {
    fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            records: Vec::new(),
        }
    }

    fn push(&mut self, key: String, value: f64) {
        if value > 0.0 {
            self.records.push(MetricRecord {
                key,
                timestamp: self.timestamp,
                value,
            });
        }
    }

    fn push_opt(&mut self, key: impl FnOnce() -> String, value: Option<f64>) {
        if let Some(v) = value.filter(|v| *v > 0.0) {
            self.push(key(), v);
        }
    }
}

fn threads(sink: &mut RecordSink, prefix: &[&str], threads: &ThreadMap) {
    for (name, stats) in threads {
        let mut parts = prefix.to_vec();
        parts.push(name);

        parts.push("used");
        sink.push(key(&parts), stats.used);
        parts.pop();
        parts.push("ready");
        sink.push(key(&parts), stats.ready);
    }
}

/// Builds metric records from merged statistics
#[derive(Debug, Clone, Copy)]
pub struct MetricFlattener {
    usage_alert_threshold: f64,
}

impl Default for MetricFlattener {
    fn default() -> Self {
        Self::new(DEFAULT_USAGE_ALERT_THRESHOLD)
    }
}

impl MetricFlattener {
    pub fn new(usage_alert_threshold: f64) -> Self {
        Self {
            usage_alert_threshold,
        }
    }

    pub fn usage_alert_threshold(&self) -> f64 {
        self.usage_alert_threshold
    }

    /// Records for a single edge node
    pub fn edge_node(&self, node: &EdgeNodeStats, timestamp: i64) -> Vec<MetricRecord> {
        let mut sink = RecordSink::new(timestamp);

        for (core, stats) in &node.performance.cpu_stats {
            for (name, value) in stats.fields() {
                let core_label = format!("Cores:{core}");
                sink.push_opt(
                    || key(&["CPU_Stats", &core_label, &name.to_uppercase()]),
                    value,
                );
            }
        }

        for (cache_type, rates) in node.performance.flow_cache_stats.categories() {
            for (core, rate) in rates {
                let core_label = format!("Core:{core}");
                sink.push_opt(
                    || key(&["Flow_Cache_Stats", cache_type, &core_label]),
                    *rate,
                );
            }
        }

        for (interface, stats) in &node.interfaces {
            let port_label = format!("PhysicalPorts:{interface}");
            for (name, value) in stats.fields() {
                sink.push(key(&[&port_label, &name.to_uppercase()]), value);
            }
        }

        sink.records
    }

    /// Records for every host of a cluster plus the fleet-wide threshold counter
    pub fn esxi_cluster(&self, cluster: &ClusterStats, timestamp: i64) -> Vec<MetricRecord> {
        let mut sink = RecordSink::new(timestamp);
        let mut fleet_over_threshold = 0u32;

        for (host_id, host) in &cluster.hosts {
            for (nic, entry) in &host.nic_stats {
                if let NicEntry::Plain(stats) = entry {
                    self.plain_nic(&mut sink, host_id, nic.as_str(), stats);
                }
            }
            for entry in host.nic_stats.values() {
                if let NicEntry::Aggregated(ens) = entry {
                    self.aggregated_nic(&mut sink, host_id, ens);
                }
            }

            let host_over_threshold: u32 = host
                .nic_stats
                .values()
                .map(|entry| self.threads_over_threshold(entry))
                .sum();
            if host_over_threshold > 0 {
                sink.push(
                    key(&["ESXi", host_id, "threads_over_usage_threshold"]),
                    f64::from(host_over_threshold),
                );
                fleet_over_threshold += host_over_threshold;
            }
        }

        sink.push(
            key(&["ESXi", "max_values", "threads_over_usage_threshold_(All_ESXis)"]),
            f64::from(fleet_over_threshold),
        );

        sink.records
    }

    fn plain_nic(&self, sink: &mut RecordSink, host_id: &str, nic: &str, stats: &NicStats) {
        sink.push(key(&["ESXi", host_id, nic, "max_values", "used"]), stats.max_used);
        sink.push(key(&["ESXi", host_id, nic, "max_values", "ready"]), stats.max_ready);
        threads(sink, &["ESXi", host_id, nic], &stats.threads);
    }

    fn aggregated_nic(&self, sink: &mut RecordSink, host_id: &str, ens: &AggregatedNicStats) {
        sink.push(key(&["ESXi", host_id, ENS_LABEL, "max_values", "used"]), ens.max_used);
        sink.push(key(&["ESXi", host_id, ENS_LABEL, "max_values", "ready"]), ens.max_ready);

        for direction in [Direction::Tx, Direction::Rx] {
            let prefix = ["ESXi", host_id, ENS_LABEL, direction.label()];
            threads(sink, &prefix, &ens.bucket(direction).threads);
        }
    }

    fn is_over_threshold(&self, used: f64) -> bool {
        used > 0.0 && used >= self.usage_alert_threshold
    }

    /// Threads of one NIC entry whose usage reached the alert threshold
    pub fn threads_over_threshold(&self, entry: &NicEntry) -> u32 {
        let count = |threads: &ThreadMap| {
            threads
                .values()
                .filter(|t| self.is_over_threshold(t.used))
                .count() as u32
        };

        match entry {
            NicEntry::Plain(stats) => count(&stats.threads),
            NicEntry::Aggregated(ens) => count(&ens.tx.threads) + count(&ens.rx.threads),
        }
    }

    /// Cluster-level maxima, averages and totals
    pub fn cluster_summary(&self, aggregate: &ClusterAggregate, timestamp: i64) -> Vec<MetricRecord> {
        let mut sink = RecordSink::new(timestamp);

        for (name, value) in aggregate.cpu_max.fields() {
            let stat = if name == "usage" { "cpu_usage" } else { name };
            sink.push(key(&["EdgeNodes", "max_values", stat]), value);
        }

        for (cache_type, mean) in [
            ("micro_hit_rate", &aggregate.micro_hit_rate),
            ("mega_hit_rate", &aggregate.mega_hit_rate),
        ] {
            sink.push_opt(|| key(&["EdgeNodes", "average_values", cache_type]), mean.mean());
        }

        let totals = &aggregate.interface_totals;
        sink.push(key(&["EdgeNodes", "total_values", "rx_misses"]), totals.rx_misses);
        sink.push(key(&["EdgeNodes", "total_values", "tx_errors"]), totals.tx_errors);

        sink.push(key(&["ESXi", "max_values", "used"]), aggregate.esxi_max.used);
        sink.push(key(&["ESXi", "max_values", "ready"]), aggregate.esxi_max.ready);

        sink.records
    }
}
