//! ESXi host collection

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{is_empty_payload, net_stats_command, Collection, HostKind, RemoteShell, Target};
use crate::error::StatsError;
use crate::extract::extract_host;
use crate::models::{ClusterStats, Collected, HostStats};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::settings::{EdgeClusterConfig, Settings};

/// Collects NIC thread statistics from the ESXi hosts of an edge cluster
pub struct EsxiCollector {
    shell: Arc<dyn RemoteShell>,
    clusters: BTreeMap<String, EdgeClusterConfig>,
    interval_secs: u64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl EsxiCollector {
    pub fn new(shell: Arc<dyn RemoteShell>, settings: &Settings) -> Self {
        Self {
            shell,
            clusters: settings.edge_clusters.clone(),
            interval_secs: settings.collection.perfstats_interval_secs,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new(settings.vrops_instance.ip.clone()),
        }
    }

    /// Collect every host of `cluster_id`, one at a time.
    ///
    /// An unknown cluster yields the empty cluster template.
    pub async fn collect_cluster(&self, cluster_id: &str) -> Collection<ClusterStats> {
        let mut collection = Collection {
            stats: ClusterStats::template(),
            fallbacks: Vec::new(),
        };

        let Some(cluster) = self.clusters.get(cluster_id) else {
            warn!(error = %StatsError::UnknownCluster(cluster_id.to_string()), "Skipping ESXi collection");
            return collection;
        };

        info!(
            cluster_id = %cluster_id,
            hosts = cluster.esxi_hosts.len(),
            "Collecting ESXi cluster stats"
        );

        for (host_id, address) in &cluster.esxi_hosts {
            let target = Target::esxi(host_id, address);
            match self.collect_host(&target).await {
                Collected::Ok(host) => {
                    self.metrics.inc_host_collected(HostKind::Esxi);
                    collection.stats.record_host(host_id, host);
                }
                Collected::Failed(reason) => {
                    self.metrics.inc_host_fallback(HostKind::Esxi);
                    self.logger.log_host_fallback(HostKind::Esxi, host_id, &reason);
                    collection
                        .stats
                        .hosts
                        .insert(host_id.clone(), HostStats::template());
                    collection.fallbacks.push(host_id.clone());
                }
            }
        }

        self.shell.disconnect_all().await;

        debug!(
            used = collection.stats.max_values.used,
            ready = collection.stats.max_values.ready,
            "Cluster max values"
        );
        collection
    }

    /// Collect a single host; the session is closed before returning
    pub async fn collect_host(&self, target: &Target) -> Collected<HostStats> {
        let session = match self.shell.connect(target).await {
            Ok(session) => session,
            Err(e) => return Collected::failed(e),
        };

        let payload = self
            .shell
            .execute(&session, &net_stats_command(self.interval_secs))
            .await;
        self.shell.disconnect(&session).await;

        if is_empty_payload(&payload) {
            return Collected::failed(StatsError::EmptyPayload {
                target: target.id.clone(),
            });
        }

        Collected::Ok(extract_host(&payload))
    }
}
