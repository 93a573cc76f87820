//! Collect-and-publish cycle
//!
//! One cycle resolves backend resource ids, collects both host kinds, merges
//! them into their templates, flattens them into per-resource metric batches
//! and publishes everything in one call. A host failure never aborts the
//! cycle; missing resource mappings or a rejected publish do.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aggregate::cluster_aggregate;
use crate::collector::{EdgeCollector, EsxiCollector, RemoteShell};
use crate::flatten::MetricFlattener;
use crate::health::{components, ComponentHealth, CycleSummary, HealthRegistry};
use crate::merge::merge_stats;
use crate::models::{ClusterStats, EdgeFleetStats};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::settings::Settings;
use crate::sync::{
    MonitoringBackend, ResourceMetrics, SyncError, EDGE_CLUSTER, NSXT_ADAPTER, TRANSPORT_NODE,
};

/// Cycle-level failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to get resource mappings from vROps: {0}")]
    ResourceMapping(String),

    #[error("no stats collected to publish")]
    NothingToPublish,

    #[error("failed to publish metrics: {0}")]
    Publish(#[from] SyncError),
}

/// Merged statistics and the batches built from them
#[derive(Debug, Clone, Default)]
pub struct AssembledBatch {
    pub resources: Vec<ResourceMetrics>,
    pub edge: EdgeFleetStats,
    pub esxi: ClusterStats,
}

impl AssembledBatch {
    pub fn record_count(&self) -> usize {
        self.resources.iter().map(|r| r.records.len()).sum()
    }
}

/// Turns collected stats into per-resource metric batches
pub struct BatchAssembler<'a> {
    flattener: MetricFlattener,
    node_ids: &'a BTreeMap<String, String>,
    cluster_ids: &'a BTreeMap<String, String>,
    timestamp: i64,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(
        flattener: MetricFlattener,
        node_ids: &'a BTreeMap<String, String>,
        cluster_ids: &'a BTreeMap<String, String>,
        timestamp: i64,
    ) -> Self {
        Self {
            flattener,
            node_ids,
            cluster_ids,
            timestamp,
        }
    }

    /// Merge and flatten.
    ///
    /// Edge stats merge into one template per mapped node; every mapped node
    /// becomes its own resource. ESXi host metrics and the cluster summary go
    /// to the cluster's resource.
    pub fn assemble(
        &self,
        edge: &EdgeFleetStats,
        cluster_id: Option<&str>,
        esxi: &ClusterStats,
    ) -> AssembledBatch {
        let edge = merge_stats(&EdgeFleetStats::template_for(self.node_ids.keys()), edge);
        let esxi = merge_stats(&ClusterStats::template(), esxi);
        let mut resources = Vec::new();

        for (node_id, node) in &edge.nodes {
            let Some(resource_id) = self.node_ids.get(node_id) else {
                debug!(node_id = %node_id, "Node not found in vROps mappings");
                continue;
            };
            let records = self.flattener.edge_node(node, self.timestamp);
            if !records.is_empty() {
                resources.push(ResourceMetrics {
                    resource_id: resource_id.clone(),
                    records,
                });
            }
        }

        match cluster_id.map(|id| (id, self.cluster_ids.get(id))) {
            Some((_, Some(resource_id))) => {
                let mut records = self.flattener.esxi_cluster(&esxi, self.timestamp);
                let summary = cluster_aggregate(&edge, &esxi);
                records.extend(self.flattener.cluster_summary(&summary, self.timestamp));

                if records.is_empty() {
                    warn!("No ESXi or cluster metrics were processed");
                } else {
                    resources.push(ResourceMetrics {
                        resource_id: resource_id.clone(),
                        records,
                    });
                }
            }
            Some((id, None)) => warn!(cluster_id = %id, "Cluster not found in vROps mappings"),
            None => debug!("No edge cluster configured"),
        }

        AssembledBatch {
            resources,
            edge,
            esxi,
        }
    }
}

/// Outcome of a successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp: i64,
    pub resources: usize,
    pub records: usize,
    pub edge_fallbacks: Vec<String>,
    pub esxi_fallbacks: Vec<String>,
}

impl From<&CycleReport> for CycleSummary {
    fn from(report: &CycleReport) -> Self {
        Self {
            timestamp: report.timestamp,
            resources: report.resources,
            records: report.records,
            fallback_hosts: report
                .edge_fallbacks
                .iter()
                .chain(&report.esxi_fallbacks)
                .cloned()
                .collect(),
        }
    }
}

/// Collects, merges, flattens and publishes
pub struct StatsPipeline {
    edge: EdgeCollector,
    esxi: EsxiCollector,
    backend: Arc<dyn MonitoringBackend>,
    flattener: MetricFlattener,
    cluster: Option<String>,
    edge_node_count: usize,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl StatsPipeline {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        backend: Arc<dyn MonitoringBackend>,
        settings: &Settings,
    ) -> Self {
        Self {
            edge: EdgeCollector::new(shell.clone(), settings),
            esxi: EsxiCollector::new(shell, settings),
            backend,
            flattener: MetricFlattener::new(settings.collection.usage_alert_threshold),
            cluster: settings.selected_cluster().map(str::to_string),
            edge_node_count: settings.edge_nodes.len(),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new(settings.vrops_instance.ip.clone()),
            health: None,
        }
    }

    /// Report component health after every cycle
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    async fn resolve(&self, resource_kind: &str) -> Result<BTreeMap<String, String>, PipelineError> {
        let map = self
            .backend
            .resource_map(NSXT_ADAPTER, resource_kind)
            .await
            .map_err(|e| PipelineError::ResourceMapping(e.to_string()))?;

        if map.is_empty() {
            return Err(PipelineError::ResourceMapping(format!(
                "no {resource_kind} resources returned"
            )));
        }
        Ok(map)
    }

    async fn report_health(&self, name: &str, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.update(name, health).await;
        }
    }

    /// Run one cycle
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let started = Instant::now();
        let result = self.cycle().await;

        self.metrics
            .observe_cycle_duration(started.elapsed().as_secs_f64());
        self.metrics.inc_cycle(result.is_ok());
        if let Some(registry) = &self.health {
            if let Ok(report) = &result {
                registry.record_cycle(report.into()).await;
            }
            registry.set_ready(true).await;
        }

        result
    }

    async fn cycle(&self) -> Result<CycleReport, PipelineError> {
        let node_ids = self.resolve(TRANSPORT_NODE).await?;
        let cluster_ids = self.resolve(EDGE_CLUSTER).await?;
        info!(
            edge_nodes = node_ids.len(),
            clusters = cluster_ids.len(),
            "Resolved vROps resources"
        );

        let timestamp = chrono::Utc::now().timestamp_millis();
        self.logger
            .log_cycle_started(self.edge_node_count, usize::from(self.cluster.is_some()));

        let edge = self.edge.collect_all().await;
        self.report_health(
            components::EDGE_COLLECTOR,
            ComponentHealth::from_collection(edge.stats.nodes.len(), edge.fallbacks.len()),
        )
        .await;

        let esxi = match &self.cluster {
            Some(cluster_id) => {
                let collection = self.esxi.collect_cluster(cluster_id).await;
                self.report_health(
                    components::ESXI_COLLECTOR,
                    ComponentHealth::from_collection(
                        collection.stats.hosts.len(),
                        collection.fallbacks.len(),
                    ),
                )
                .await;
                collection
            }
            None => Default::default(),
        };

        let assembler =
            BatchAssembler::new(self.flattener, &node_ids, &cluster_ids, timestamp);
        let batch = assembler.assemble(&edge.stats, self.cluster.as_deref(), &esxi.stats);

        if batch.resources.is_empty() {
            warn!("No stats collected to publish. Check vROps mappings and metric processing.");
            return Err(PipelineError::NothingToPublish);
        }

        let records = batch.record_count();
        if let Err(e) = self.backend.publish(&batch.resources).await {
            self.metrics.inc_publish_failures();
            self.logger.log_publish_failed(&e.to_string());
            self.report_health(components::PUBLISHER, ComponentHealth::unhealthy(e.to_string()))
                .await;
            return Err(PipelineError::Publish(e));
        }

        self.metrics.add_records_published(records);
        self.report_health(components::PUBLISHER, ComponentHealth::healthy())
            .await;
        self.logger.log_cycle_completed(
            batch.resources.len(),
            records,
            edge.fallbacks.len() + esxi.fallbacks.len(),
        );

        Ok(CycleReport {
            timestamp,
            resources: batch.resources.len(),
            records,
            edge_fallbacks: edge.fallbacks,
            esxi_fallbacks: esxi.fallbacks,
        })
    }

    /// Run one cycle and raise a backend notification if it fails
    pub async fn run_and_notify(&self) -> Result<CycleReport, PipelineError> {
        let result = self.run_cycle().await;
        if let Err(e) = &result {
            error!(error = %e, "Collection cycle failed");
            self.backend
                .notify(&format!("Failed to collect and publish stats: {e}"))
                .await;
        }
        result
    }
}
