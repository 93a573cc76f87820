//! NSX edge node collection

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    is_empty_payload, perfstats_command, Collection, HostKind, RemoteShell, Target,
    EDGE_INTERFACES_COMMAND,
};
use crate::aggregate::edge_fleet_extremes;
use crate::extract::{extract_interfaces, extract_performance};
use crate::models::{Collected, EdgeFleetStats, EdgeNodeStats};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::settings::Settings;

/// Collects interface, CPU and flow-cache statistics from edge nodes
pub struct EdgeCollector {
    shell: Arc<dyn RemoteShell>,
    nodes: BTreeMap<String, String>,
    interval_secs: u64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl EdgeCollector {
    pub fn new(shell: Arc<dyn RemoteShell>, settings: &Settings) -> Self {
        Self {
            shell,
            nodes: settings.edge_nodes.clone(),
            interval_secs: settings.collection.perfstats_interval_secs,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new(settings.vrops_instance.ip.clone()),
        }
    }

    /// Collect every configured node, one at a time.
    ///
    /// Unreachable nodes are recorded with their error. The fleet aggregate
    /// over the reachable nodes is attached as `max_values`.
    pub async fn collect_all(&self) -> Collection<EdgeFleetStats> {
        let mut collection = Collection {
            stats: EdgeFleetStats::default(),
            fallbacks: Vec::new(),
        };

        info!(nodes = self.nodes.len(), "Collecting edge node stats");

        for (node_id, address) in &self.nodes {
            let target = Target::edge(node_id, address);
            let node = match self.collect_node(&target).await {
                Collected::Ok(node) => {
                    self.metrics.inc_host_collected(HostKind::EdgeNode);
                    node
                }
                Collected::Failed(reason) => {
                    self.metrics.inc_host_fallback(HostKind::EdgeNode);
                    self.logger
                        .log_host_fallback(HostKind::EdgeNode, node_id, &reason);
                    collection.fallbacks.push(node_id.clone());
                    EdgeNodeStats::failed(reason)
                }
            };
            collection.stats.nodes.insert(node_id.clone(), node);
        }

        self.shell.disconnect_all().await;

        collection.stats.max_values = Some(edge_fleet_extremes(&collection.stats));
        collection
    }

    /// Collect one node; only a failed connection fails the node
    pub async fn collect_node(&self, target: &Target) -> Collected<EdgeNodeStats> {
        let session = match self.shell.connect(target).await {
            Ok(session) => session,
            Err(e) => return Collected::failed(e),
        };

        let interfaces_payload = self.shell.execute(&session, EDGE_INTERFACES_COMMAND).await;
        let perf_payload = self
            .shell
            .execute(&session, &perfstats_command(self.interval_secs))
            .await;
        self.shell.disconnect(&session).await;

        let interfaces = extract_interfaces(&interfaces_payload);
        let performance = extract_performance(&perf_payload).unwrap_or_else(|| {
            debug!(
                node_id = %target.id,
                empty = is_empty_payload(&perf_payload),
                "No performance data returned"
            );
            Default::default()
        });

        Collected::Ok(EdgeNodeStats {
            interfaces,
            performance,
            error: None,
        })
    }
}
