//! Fleet-wide maxima, minima, averages and totals

use serde::{Deserialize, Serialize};

use crate::models::{ClusterStats, EdgeFleetStats, EdgeNodeStats, MaxValues};

/// Maximum interface error counters across the fleet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceMaxima {
    pub rx_errors: f64,
    pub rx_misses: f64,
    pub tx_errors: f64,
}

/// Maximum CPU figures across every core of every node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMaxima {
    pub usage: f64,
    pub crypto: f64,
    pub slowpath: f64,
    pub intercore: f64,
}

impl CpuMaxima {
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("usage", self.usage),
            ("crypto", self.crypto),
            ("slowpath", self.slowpath),
            ("intercore", self.intercore),
        ]
    }

    fn fold(&mut self, node: &EdgeNodeStats) {
        for core in node.performance.cpu_stats.values() {
            self.usage = self.usage.max(core.usage.unwrap_or(0.0));
            self.crypto = self.crypto.max(core.crypto.unwrap_or(0.0));
            self.slowpath = self.slowpath.max(core.slowpath.unwrap_or(0.0));
            self.intercore = self.intercore.max(core.intercore.unwrap_or(0.0));
        }
    }
}

/// Lowest flow-cache hit rates; `None` when no reading was available
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitRateMinima {
    pub micro_hit_rate: Option<f64>,
    pub mega_hit_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeFleetAggregate {
    pub interfaces: InterfaceMaxima,
    pub cpu: CpuMaxima,
    pub flow_cache: HitRateMinima,
}

/// Running minimum that remembers whether anything was folded in
#[derive(Debug, Clone, Copy)]
struct RunningMin(f64);

impl RunningMin {
    fn new() -> Self {
        Self(f64::INFINITY)
    }

    fn fold(&mut self, value: f64) {
        self.0 = self.0.min(value);
    }

    fn finish(self) -> Option<f64> {
        self.0.is_finite().then_some(self.0)
    }
}

/// Fleet extremes over all nodes that were collected successfully
pub fn edge_fleet_extremes(fleet: &EdgeFleetStats) -> EdgeFleetAggregate {
    let mut interfaces = InterfaceMaxima::default();
    let mut cpu = CpuMaxima::default();
    let mut micro = RunningMin::new();
    let mut mega = RunningMin::new();

    for node in fleet.nodes.values().filter(|node| !node.is_failed()) {
        for port in node.interfaces.values() {
            interfaces.rx_errors = interfaces.rx_errors.max(port.rx_errors);
            interfaces.rx_misses = interfaces.rx_misses.max(port.rx_misses);
            interfaces.tx_errors = interfaces.tx_errors.max(port.tx_errors);
        }

        cpu.fold(node);

        let flow = &node.performance.flow_cache_stats;
        flow.micro_hit_rate.values().flatten().for_each(|v| micro.fold(*v));
        flow.mega_hit_rate.values().flatten().for_each(|v| mega.fold(*v));
    }

    EdgeFleetAggregate {
        interfaces,
        cpu,
        flow_cache: HitRateMinima {
            micro_hit_rate: micro.finish(),
            mega_hit_rate: mega.finish(),
        },
    }
}

/// Sum and count for an average over strictly positive readings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    pub sum: f64,
    pub count: u64,
}

impl RunningMean {
    pub fn fold(&mut self, value: f64) {
        if value > 0.0 {
            self.sum += value;
            self.count += 1;
        }
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Totals of positive interface counters across the fleet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InterfaceTotals {
    pub rx_misses: f64,
    pub tx_errors: f64,
}

/// Cluster-level figures published alongside the ESXi metrics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterAggregate {
    pub cpu_max: CpuMaxima,
    pub micro_hit_rate: RunningMean,
    pub mega_hit_rate: RunningMean,
    pub interface_totals: InterfaceTotals,
    pub esxi_max: MaxValues,
}

/// Cluster pass over the merged edge fleet and ESXi cluster
pub fn cluster_aggregate(edge: &EdgeFleetStats, esxi: &ClusterStats) -> ClusterAggregate {
    let mut aggregate = ClusterAggregate {
        esxi_max: esxi.max_values,
        ..ClusterAggregate::default()
    };

    for node in edge.nodes.values().filter(|node| !node.is_failed()) {
        aggregate.cpu_max.fold(node);

        let flow = &node.performance.flow_cache_stats;
        for rate in flow.micro_hit_rate.values().flatten() {
            aggregate.micro_hit_rate.fold(*rate);
        }
        for rate in flow.mega_hit_rate.values().flatten() {
            aggregate.mega_hit_rate.fold(*rate);
        }

        for port in node.interfaces.values() {
            if port.rx_misses > 0.0 {
                aggregate.interface_totals.rx_misses += port.rx_misses;
            }
            if port.tx_errors > 0.0 {
                aggregate.interface_totals.tx_errors += port.tx_errors;
            }
        }
    }

    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn node(usage: Option<f64>, micro: Option<f64>, rx_misses: f64) -> EdgeNodeStats {
        let mut node = EdgeNodeStats::default();
        node.performance.cpu_stats.insert(
            "0".into(),
            CoreStats { usage, crypto: Some(1.0), ..CoreStats::default() },
        );
        node.performance
            .flow_cache_stats
            .micro_hit_rate
            .insert("0".into(), micro);
        node.interfaces.insert(
            "fp-eth0".into(),
            InterfaceStats { rx_errors: 1.0, rx_misses, tx_errors: 0.0 },
        );
        node
    }

    #[test]
    fn test_fleet_extremes_skip_failed_nodes() {
        let mut fleet = EdgeFleetStats::default();
        fleet.nodes.insert("a".into(), node(Some(40.0), Some(90.0), 3.0));
        fleet.nodes.insert("b".into(), node(Some(70.0), Some(80.0), 1.0));
        let mut failed = node(Some(99.0), Some(1.0), 50.0);
        failed.error = Some("timeout".into());
        fleet.nodes.insert("c".into(), failed);

        let agg = edge_fleet_extremes(&fleet);
        assert_eq!(agg.cpu.usage, 70.0);
        assert_eq!(agg.cpu.crypto, 1.0);
        assert_eq!(agg.interfaces.rx_misses, 3.0);
        assert_eq!(agg.flow_cache.micro_hit_rate, Some(80.0));
    }

    #[test]
    fn test_hit_rate_minimum_without_readings_is_none() {
        let mut fleet = EdgeFleetStats::default();
        fleet.nodes.insert("a".into(), node(None, None, 0.0));

        let agg = edge_fleet_extremes(&fleet);
        assert_eq!(agg.flow_cache.micro_hit_rate, None);
        assert_eq!(agg.flow_cache.mega_hit_rate, None);
        assert_eq!(agg.cpu.usage, 0.0);

        let empty = edge_fleet_extremes(&EdgeFleetStats::default());
        assert_eq!(empty, EdgeFleetAggregate::default());
    }

    #[test]
    fn test_cluster_aggregate_means_and_totals() {
        let mut fleet = EdgeFleetStats::default();
        fleet.nodes.insert("a".into(), node(Some(40.0), Some(90.0), 3.0));
        fleet.nodes.insert("b".into(), node(None, Some(0.0), 2.0));
        fleet.nodes.insert("c".into(), node(Some(10.0), Some(70.0), 0.0));

        let mut cluster = ClusterStats::template();
        cluster.max_values = MaxValues { used: 12.0, ready: 3.0 };

        let agg = cluster_aggregate(&fleet, &cluster);
        assert_eq!(agg.cpu_max.usage, 40.0);
        assert_eq!(agg.micro_hit_rate.count, 2);
        assert_eq!(agg.micro_hit_rate.mean(), Some(80.0));
        assert_eq!(agg.mega_hit_rate.mean(), None);
        assert_eq!(agg.interface_totals.rx_misses, 5.0);
        assert_eq!(agg.interface_totals.tx_errors, 0.0);
        assert_eq!(agg.esxi_max.used, 12.0);
    }
}
