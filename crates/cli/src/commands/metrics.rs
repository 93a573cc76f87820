//! Metric preview and offline flattening

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use colored::Colorize;
use stats_lib::collector::{EdgeCollector, EsxiCollector};
use stats_lib::merge::merge_stats;
use stats_lib::models::{ClusterStats, EdgeFleetStats};
use stats_lib::sync::ResourceMetrics;
use stats_lib::{BatchAssembler, MetricFlattener};
use std::collections::BTreeMap;
use std::path::Path;

use super::Context;
use crate::output::{print_info, print_json, print_table, print_success, OutputFormat, RecordRow};

/// Kind of saved stats document
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatsKind {
    /// An edge fleet document (`nodes` keyed by node id)
    Edge,
    /// An ESXi cluster document (`hosts` keyed by host id)
    Esxi,
}

fn print_resources(resources: &[ResourceMetrics], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(resources)?,
        OutputFormat::Table => {
            let rows = resources
                .iter()
                .flat_map(|r| r.records.iter().map(|rec| RecordRow::new(&r.resource_id, rec)))
                .collect();
            print_table(rows);

            let total: usize = resources.iter().map(|r| r.records.len()).sum();
            println!("\nTotal: {} records for {} resources", total, resources.len());
        }
    }
    Ok(())
}

/// Run a full collection and show what would be published.
///
/// Resources are labelled with fleet ids; vROps is not contacted.
pub async fn preview(ctx: &Context, cluster: Option<String>, format: OutputFormat) -> Result<()> {
    let shell = ctx.shell()?;
    let cluster_id = ctx.cluster(cluster);

    let edge = EdgeCollector::new(shell.clone(), &ctx.settings)
        .collect_all()
        .await;
    let esxi = match &cluster_id {
        Some(id) => EsxiCollector::new(shell, &ctx.settings).collect_cluster(id).await,
        None => Default::default(),
    };

    let node_ids: BTreeMap<String, String> = ctx
        .settings
        .edge_nodes
        .keys()
        .map(|id| (id.clone(), id.clone()))
        .collect();
    let cluster_ids: BTreeMap<String, String> = cluster_id
        .iter()
        .map(|id| (id.clone(), id.clone()))
        .collect();

    let flattener = MetricFlattener::new(ctx.settings.collection.usage_alert_threshold);
    let timestamp = chrono::Utc::now().timestamp_millis();
    let batch = BatchAssembler::new(flattener, &node_ids, &cluster_ids, timestamp).assemble(
        &edge.stats,
        cluster_id.as_deref(),
        &esxi.stats,
    );

    print_resources(&batch.resources, format)?;
    if let OutputFormat::Table = format {
        for host in edge.fallbacks.iter().chain(&esxi.fallbacks) {
            print_info(&format!("{} reported with fallback stats", host.yellow()));
        }
    }
    Ok(())
}

/// Flatten a saved stats document without contacting any host
pub fn flatten_file(
    path: &Path,
    kind: StatsKind,
    threshold: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let flattener = threshold.map_or_else(MetricFlattener::default, MetricFlattener::new);
    let timestamp = chrono::Utc::now().timestamp_millis();

    let resources = match kind {
        StatsKind::Edge => {
            let collected: EdgeFleetStats = serde_json::from_str(&text)
                .with_context(|| format!("{} is not an edge fleet document", path.display()))?;
            let fleet = merge_stats(
                &EdgeFleetStats::template_for(collected.nodes.keys().cloned()),
                &collected,
            );
            fleet
                .nodes
                .iter()
                .map(|(id, node)| ResourceMetrics {
                    resource_id: id.clone(),
                    records: flattener.edge_node(node, timestamp),
                })
                .filter(|r| !r.records.is_empty())
                .collect::<Vec<_>>()
        }
        StatsKind::Esxi => {
            let collected: ClusterStats = serde_json::from_str(&text)
                .with_context(|| format!("{} is not an ESXi cluster document", path.display()))?;
            let cluster = merge_stats(&ClusterStats::template(), &collected);
            let records = flattener.esxi_cluster(&cluster, timestamp);
            if records.is_empty() {
                Vec::new()
            } else {
                vec![ResourceMetrics {
                    resource_id: "cluster".to_string(),
                    records,
                }]
            }
        }
    };

    print_resources(&resources, format)?;
    if let OutputFormat::Table = format {
        print_success(&format!("Flattened {}", path.display()));
    }
    Ok(())
}
