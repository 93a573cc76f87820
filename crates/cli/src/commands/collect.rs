//! Live collection commands

use anyhow::{bail, Result};
use colored::Colorize;
use stats_lib::collector::{EdgeCollector, EsxiCollector};
use stats_lib::models::{EdgeNodeStats, HitRates, NicEntry};
use stats_lib::MetricFlattener;
use tabled::Tabled;

use super::Context;
use crate::output::{
    color_status, color_usage, format_value, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Max CPU %")]
    cpu: String,
    #[tabled(rename = "Micro hit %")]
    micro: String,
    #[tabled(rename = "Mega hit %")]
    mega: String,
    #[tabled(rename = "RX errors")]
    rx_errors: String,
    #[tabled(rename = "RX misses")]
    rx_misses: String,
    #[tabled(rename = "TX errors")]
    tx_errors: String,
}

fn lowest(rates: &HitRates) -> Option<f64> {
    rates.values().flatten().copied().reduce(f64::min)
}

impl EdgeRow {
    fn new(node_id: &str, node: &EdgeNodeStats) -> Self {
        if node.is_failed() {
            return Self {
                node: node_id.to_string(),
                status: color_status("failed"),
                cpu: "-".into(),
                micro: "-".into(),
                mega: "-".into(),
                rx_errors: "-".into(),
                rx_misses: "-".into(),
                tx_errors: "-".into(),
            };
        }

        let cpu = node
            .performance
            .cpu_stats
            .values()
            .filter_map(|core| core.usage)
            .reduce(f64::max);
        let total = |field: fn(&stats_lib::models::InterfaceStats) -> f64| {
            node.interfaces.values().map(field).sum::<f64>().to_string()
        };
        let flow = &node.performance.flow_cache_stats;

        Self {
            node: node_id.to_string(),
            status: color_status("ok"),
            cpu: format_value(cpu),
            micro: format_value(lowest(&flow.micro_hit_rate)),
            mega: format_value(lowest(&flow.mega_hit_rate)),
            rx_errors: total(|i| i.rx_errors),
            rx_misses: total(|i| i.rx_misses),
            tx_errors: total(|i| i.tx_errors),
        }
    }
}

/// Collect every edge node and print a per-node summary
pub async fn show_edge(ctx: &Context, format: OutputFormat) -> Result<()> {
    let collector = EdgeCollector::new(ctx.shell()?, &ctx.settings);
    let collection = collector.collect_all().await;
    let fleet = &collection.stats;

    match format {
        OutputFormat::Json => print_json(fleet)?,
        OutputFormat::Table => {
            println!("{}", "Edge Nodes".bold());
            let rows = fleet
                .nodes
                .iter()
                .map(|(id, node)| EdgeRow::new(id, node))
                .collect();
            print_table(rows);

            if let Some(max) = &fleet.max_values {
                println!(
                    "\nFleet: max CPU {} | min micro hit {} | min mega hit {}",
                    format_value(Some(max.cpu.usage)),
                    format_value(max.flow_cache.micro_hit_rate),
                    format_value(max.flow_cache.mega_hit_rate),
                );
            }
            for (id, node) in &fleet.nodes {
                if let Some(error) = &node.error {
                    print_warning(&format!("{id}: {error}"));
                }
            }
        }
    }

    Ok(())
}

#[derive(Tabled)]
struct NicRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "NIC")]
    nic: String,
    #[tabled(rename = "Max used %")]
    max_used: String,
    #[tabled(rename = "Max ready %")]
    max_ready: String,
    #[tabled(rename = "Threads")]
    threads: usize,
    #[tabled(rename = "Over threshold")]
    over_threshold: usize,
}

impl NicRow {
    fn new(
        host_id: &str,
        status: &str,
        nic: &str,
        entry: &NicEntry,
        flattener: &MetricFlattener,
    ) -> Self {
        let threads = match entry {
            NicEntry::Plain(stats) => stats.threads.len(),
            NicEntry::Aggregated(ens) => ens.tx.threads.len() + ens.rx.threads.len(),
        };

        Self {
            host: host_id.to_string(),
            status: color_status(status),
            nic: nic.to_string(),
            max_used: color_usage(entry.max_used(), flattener.usage_alert_threshold()),
            max_ready: format!("{:.2}", entry.max_ready()),
            threads,
            over_threshold: flattener.threads_over_threshold(entry) as usize,
        }
    }
}

/// Collect one edge cluster's ESXi hosts and print per-NIC maxima
pub async fn show_esxi(ctx: &Context, cluster: Option<String>, format: OutputFormat) -> Result<()> {
    let Some(cluster_id) = ctx.cluster(cluster) else {
        bail!("no edge clusters configured");
    };

    let collector = EsxiCollector::new(ctx.shell()?, &ctx.settings);
    let collection = collector.collect_cluster(&cluster_id).await;
    let stats = &collection.stats;

    if let OutputFormat::Json = format {
        return print_json(stats);
    }

    let flattener = MetricFlattener::new(ctx.settings.collection.usage_alert_threshold);
    let threshold = flattener.usage_alert_threshold();
    let mut rows = Vec::new();

    for (host_id, host) in &stats.hosts {
        let status = if collection.fallbacks.contains(host_id) {
            "fallback"
        } else {
            "ok"
        };

        for (nic, entry) in &host.nic_stats {
            rows.push(NicRow::new(host_id, status, nic.as_str(), entry, &flattener));
        }
    }

    println!("{} {}", "ESXi hosts of".bold(), cluster_id.cyan());
    print_table(rows);
    println!(
        "\nCluster: max used {} | max ready {:.2}",
        color_usage(stats.max_values.used, threshold),
        stats.max_values.ready,
    );

    Ok(())
}
