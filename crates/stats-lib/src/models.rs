//! Core data models for the stats pipeline
//!
//! Two host kinds feed the pipeline: ESXi hosts report per-thread NIC
//! scheduling figures ([`HostStats`], grouped into [`ClusterStats`]) and NSX
//! edge nodes report interface counters plus CPU and flow-cache figures
//! ([`EdgeNodeStats`], grouped into [`EdgeFleetStats`]). Every record is
//! created per collection cycle and discarded after publication.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregate::EdgeFleetAggregate;
use crate::error::StatsError;

/// Key of the aggregated EnsNetWorld group inside a host's NIC map
pub const AGGREGATED_NIC: &str = "ens";

/// NICs every host carries even before any of their threads is seen
pub const SEEDED_NICS: [&str; 2] = ["vmnic2", "vmnic3"];

/// Physical ports every edge node template carries
pub const TEMPLATE_INTERFACES: [&str; 4] = ["fp-eth0", "fp-eth1", "fp-eth2", "fp-eth3"];

/// Cores every edge node template carries
pub const TEMPLATE_CORES: [&str; 3] = ["0", "1", "2"];

/// Validated NIC identifier.
///
/// Identifiers end up inside `|`-delimited metric keys, so they must be
/// non-empty and free of separators and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NicId(String);

/// Shape class of a NIC entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicKind {
    /// The EnsNetWorld group with separate tx/rx thread maps
    Aggregated,
    /// A physical NIC with a single thread map
    Plain,
}

impl NicId {
    pub fn new(raw: impl Into<String>) -> Result<Self, StatsError> {
        let raw = raw.into();
        let reason = if raw.is_empty() {
            Some("empty")
        } else if raw.contains('|') {
            Some("contains the key separator '|'")
        } else if raw.chars().any(char::is_whitespace) {
            Some("contains whitespace")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(StatsError::InvalidIdentifier { raw, reason }),
            None => Ok(Self(raw)),
        }
    }

    /// The aggregated EnsNetWorld group key
    pub fn aggregated() -> Self {
        Self(AGGREGATED_NIC.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> NicKind {
        if self.0 == AGGREGATED_NIC {
            NicKind::Aggregated
        } else {
            NicKind::Plain
        }
    }
}

impl TryFrom<String> for NicId {
    type Error = StatsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NicId> for String {
    fn from(id: NicId) -> Self {
        id.0
    }
}

impl Borrow<str> for NicId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling figures of a single NIC worker thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub used: f64,
    pub ready: f64,
}

/// Threads keyed by thread name
pub type ThreadMap = BTreeMap<String, ThreadStats>;

/// Stats for a physical NIC's poll-worker threads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NicStats {
    pub max_used: f64,
    pub max_ready: f64,
    pub threads: ThreadMap,
}

impl NicStats {
    /// Add a thread and fold it into the running maxima
    pub fn record(&mut self, thread_name: String, stats: ThreadStats) {
        self.max_used = self.max_used.max(stats.used);
        self.max_ready = self.max_ready.max(stats.ready);
        self.threads.insert(thread_name, stats);
    }
}

/// One directional bucket of the aggregated group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadGroup {
    pub threads: ThreadMap,
}

/// Direction bucket of an EnsNetWorld thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    /// Odd suffixes transmit, even suffixes receive
    pub fn from_suffix(suffix: u64) -> Self {
        if suffix % 2 == 1 {
            Direction::Tx
        } else {
            Direction::Rx
        }
    }

    /// Label used in metric keys
    pub fn label(self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        }
    }
}

/// Stats for the aggregated EnsNetWorld group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedNicStats {
    pub max_used: f64,
    pub max_ready: f64,
    pub tx: ThreadGroup,
    pub rx: ThreadGroup,
}

impl AggregatedNicStats {
    /// Add a thread to its direction bucket and fold it into the group maxima
    pub fn record(&mut self, direction: Direction, thread_name: String, stats: ThreadStats) {
        self.max_used = self.max_used.max(stats.used);
        self.max_ready = self.max_ready.max(stats.ready);
        self.bucket_mut(direction).threads.insert(thread_name, stats);
    }

    pub fn bucket(&self, direction: Direction) -> &ThreadGroup {
        match direction {
            Direction::Tx => &self.tx,
            Direction::Rx => &self.rx,
        }
    }

    fn bucket_mut(&mut self, direction: Direction) -> &mut ThreadGroup {
        match direction {
            Direction::Tx => &mut self.tx,
            Direction::Rx => &mut self.rx,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tx.threads.is_empty() && self.rx.threads.is_empty()
    }
}

/// A host's entry for one NIC identifier.
///
/// The aggregated shape is tried first when deserializing because a plain
/// entry never carries `tx`/`rx` buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NicEntry {
    Aggregated(AggregatedNicStats),
    Plain(NicStats),
}

impl NicEntry {
    /// Correctly-shaped empty entry for an identifier
    pub fn template_for(id: &NicId) -> Self {
        match id.kind() {
            NicKind::Aggregated => NicEntry::Aggregated(AggregatedNicStats::default()),
            NicKind::Plain => NicEntry::Plain(NicStats::default()),
        }
    }

    pub fn max_used(&self) -> f64 {
        match self {
            NicEntry::Aggregated(stats) => stats.max_used,
            NicEntry::Plain(stats) => stats.max_used,
        }
    }

    pub fn max_ready(&self) -> f64 {
        match self {
            NicEntry::Aggregated(stats) => stats.max_ready,
            NicEntry::Plain(stats) => stats.max_ready,
        }
    }
}

/// Running `used`/`ready` maxima
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MaxValues {
    pub used: f64,
    pub ready: f64,
}

impl MaxValues {
    pub fn fold(&mut self, used: f64, ready: f64) {
        self.used = self.used.max(used);
        self.ready = self.ready.max(ready);
    }
}

/// Per-host statistics for an ESXi host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    #[serde(default)]
    pub nic_stats: BTreeMap<NicId, NicEntry>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl HostStats {
    /// Fallback shape for a host: the seeded NICs with no threads
    pub fn template() -> Self {
        let nic_stats = SEEDED_NICS
            .iter()
            .map(|name| (NicId(name.to_string()), NicEntry::Plain(NicStats::default())))
            .collect();

        Self {
            nic_stats,
            metadata: BTreeMap::new(),
        }
    }

    /// Maxima over this host's NIC entries
    pub fn max_values(&self) -> MaxValues {
        let mut max = MaxValues::default();
        for entry in self.nic_stats.values() {
            max.fold(entry.max_used(), entry.max_ready());
        }
        max
    }
}

/// Statistics for every ESXi host of one edge cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostStats>,
    #[serde(default)]
    pub max_values: MaxValues,
}

impl ClusterStats {
    pub fn template() -> Self {
        Self::default()
    }

    /// Insert a freshly collected host and fold its maxima into the fleet maxima
    pub fn record_host(&mut self, host_id: impl Into<String>, host: HostStats) {
        let host_max = host.max_values();
        self.max_values.fold(host_max.used, host_max.ready);
        self.hosts.insert(host_id.into(), host);
    }
}

/// Error counters of one physical port
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub rx_errors: f64,
    pub rx_misses: f64,
    pub tx_errors: f64,
}

impl InterfaceStats {
    /// Counters in publication order
    pub fn fields(&self) -> [(&'static str, f64); 3] {
        [
            ("rx_errors", self.rx_errors),
            ("rx_misses", self.rx_misses),
            ("tx_errors", self.tx_errors),
        ]
    }
}

/// Dataplane figures of one CPU core; `None` means the CLI reported `n/a`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreStats {
    #[serde(default)]
    pub usage: Option<f64>,
    #[serde(default)]
    pub rx: Option<f64>,
    #[serde(default)]
    pub tx: Option<f64>,
    #[serde(default)]
    pub crypto: Option<f64>,
    #[serde(default)]
    pub slowpath: Option<f64>,
    #[serde(default)]
    pub intercore: Option<f64>,
}

impl CoreStats {
    pub fn zeroed() -> Self {
        Self {
            usage: Some(0.0),
            rx: Some(0.0),
            tx: Some(0.0),
            crypto: Some(0.0),
            slowpath: Some(0.0),
            intercore: Some(0.0),
        }
    }

    /// Readings in publication order
    pub fn fields(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("usage", self.usage),
            ("rx", self.rx),
            ("tx", self.tx),
            ("crypto", self.crypto),
            ("slowpath", self.slowpath),
            ("intercore", self.intercore),
        ]
    }
}

/// Hit rates keyed by core id
pub type HitRates = BTreeMap<String, Option<f64>>;

/// Flow-cache hit rates of both cache tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowCacheStats {
    #[serde(default)]
    pub micro_hit_rate: HitRates,
    #[serde(default)]
    pub mega_hit_rate: HitRates,
}

impl FlowCacheStats {
    pub fn categories(&self) -> [(&'static str, &HitRates); 2] {
        [
            ("micro_hit_rate", &self.micro_hit_rate),
            ("mega_hit_rate", &self.mega_hit_rate),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    #[serde(default)]
    pub cpu_stats: BTreeMap<String, CoreStats>,
    #[serde(default)]
    pub flow_cache_stats: FlowCacheStats,
}

/// Statistics for one NSX edge node.
///
/// A node whose collection failed carries the reason in `error`; such records
/// are skipped by the fleet aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeNodeStats {
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceStats>,
    #[serde(default)]
    pub performance: PerformanceStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EdgeNodeStats {
    /// Record standing in for a node that could not be collected
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Fallback shape for a node: three zeroed cores and four quiet ports
    pub fn template() -> Self {
        let cpu_stats = TEMPLATE_CORES
            .iter()
            .map(|core| (core.to_string(), CoreStats::zeroed()))
            .collect();
        let hit_rates: HitRates = TEMPLATE_CORES
            .iter()
            .map(|core| (core.to_string(), Some(0.0)))
            .collect();
        let interfaces = TEMPLATE_INTERFACES
            .iter()
            .map(|name| (name.to_string(), InterfaceStats::default()))
            .collect();

        Self {
            interfaces,
            performance: PerformanceStats {
                cpu_stats,
                flow_cache_stats: FlowCacheStats {
                    micro_hit_rate: hit_rates.clone(),
                    mega_hit_rate: hit_rates,
                },
            },
            error: None,
        }
    }
}

/// Statistics for every configured edge node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeFleetStats {
    #[serde(default)]
    pub nodes: BTreeMap<String, EdgeNodeStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_values: Option<EdgeFleetAggregate>,
}

impl EdgeFleetStats {
    /// One node template per known node id
    pub fn template_for<I, S>(node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: node_ids
                .into_iter()
                .map(|id| (id.into(), EdgeNodeStats::template()))
                .collect(),
            max_values: None,
        }
    }
}

/// A flattened, publish-ready metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub key: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub value: f64,
}

/// Outcome of one collection stage.
///
/// Callers branch on `Failed` to substitute a fallback record explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected<T> {
    Ok(T),
    Failed(String),
}

impl<T> Collected<T> {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Collected::Failed(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nic_id_validation() {
        assert!(NicId::new("vmnic4").is_ok());
        assert!(NicId::new("").is_err());
        assert!(NicId::new("vmnic|4").is_err());
        assert!(NicId::new("vmnic 4").is_err());
    }

    #[test]
    fn test_nic_id_kind() {
        assert_eq!(NicId::aggregated().kind(), NicKind::Aggregated);
        assert_eq!(NicId::new("vmnic2").unwrap().kind(), NicKind::Plain);
    }

    #[test]
    fn test_nic_id_rejects_invalid_json_key() {
        let result: Result<BTreeMap<NicId, f64>, _> =
            serde_json::from_str(r#"{"bad|key": 1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_template_for_shapes() {
        let ens = NicEntry::template_for(&NicId::aggregated());
        assert!(matches!(ens, NicEntry::Aggregated(_)));

        let plain = NicEntry::template_for(&NicId::new("vmnic7").unwrap());
        assert!(matches!(plain, NicEntry::Plain(_)));
    }

    #[test]
    fn test_nic_entry_untagged_roundtrip_keeps_shape() {
        let json = r#"{
            "ens": {"max_used": 5.0, "max_ready": 0.0, "tx": {"threads": {}}, "rx": {"threads": {}}},
            "vmnic2": {"max_used": 1.0, "max_ready": 0.5, "threads": {}}
        }"#;
        let map: BTreeMap<NicId, NicEntry> = serde_json::from_str(json).unwrap();

        assert!(matches!(map["ens"], NicEntry::Aggregated(_)));
        assert!(matches!(map["vmnic2"], NicEntry::Plain(_)));
    }

    #[test]
    fn test_direction_parity() {
        assert_eq!(Direction::from_suffix(1), Direction::Tx);
        assert_eq!(Direction::from_suffix(2), Direction::Rx);
        assert_eq!(Direction::from_suffix(3), Direction::Tx);
        assert_eq!(Direction::from_suffix(4), Direction::Rx);
    }

    #[test]
    fn test_host_template_seeds_nics() {
        let host = HostStats::template();
        assert_eq!(host.nic_stats.len(), 2);
        assert!(host.nic_stats.contains_key("vmnic2"));
        assert!(host.nic_stats.contains_key("vmnic3"));
    }

    #[test]
    fn test_record_host_folds_maxima() {
        let mut cluster = ClusterStats::template();
        for (id, used) in [("esx-1", 3.0), ("esx-2", 7.0), ("esx-3", 1.0)] {
            let mut host = HostStats::template();
            if let Some(NicEntry::Plain(nic)) = host.nic_stats.get_mut("vmnic2") {
                nic.record(
                    format!("vmnic2-pollWorld-{id}"),
                    ThreadStats { used, ready: used / 2.0 },
                );
            }
            cluster.record_host(id, host);
        }

        assert_eq!(cluster.max_values.used, 7.0);
        assert_eq!(cluster.max_values.ready, 3.5);
        assert_eq!(cluster.hosts.len(), 3);
    }

    #[test]
    fn test_edge_template_shape() {
        let node = EdgeNodeStats::template();
        assert_eq!(node.interfaces.len(), 4);
        assert_eq!(node.performance.cpu_stats.len(), 3);
        assert_eq!(node.performance.flow_cache_stats.micro_hit_rate.len(), 3);
        assert!(!node.is_failed());
    }

    #[test]
    fn test_failed_edge_node_serializes_error_marker() {
        let node = EdgeNodeStats::failed("connection refused");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["error"], "connection refused");
        assert!(node.is_failed());
    }

    #[test]
    fn test_collected_failure_keeps_reason() {
        let failed: Collected<HostStats> =
            Collected::failed(StatsError::NotConnected { target: "esx-1".into() });
        assert_eq!(failed, Collected::Failed("not connected to esx-1".to_string()));
    }
}
