//! Edge stats agent
//!
//! Collects datapath statistics from NSX edge nodes and ESXi hosts and
//! publishes them to vRealize Operations. Runs one cycle and exits by
//! default; with `--interval-secs` it keeps running and serves health and
//! metrics endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use stats_lib::{
    collector::SshTransport,
    health::HealthRegistry,
    observability::{PipelineMetrics, StructuredLogger},
    settings::{Credentials, Settings},
    sync::{ClientConfig, VropsClient},
    StatsPipeline,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "edgestats-agent")]
#[command(author, version, about = "Collect edge and ESXi datapath stats and publish them to vROps")]
struct Args {
    /// Collection settings
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Host and backend logins
    #[arg(long, default_value = "credentials.yaml")]
    credentials: PathBuf,

    /// Repeat the cycle every N seconds instead of running once
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Port for /healthz, /readyz and /metrics in daemon mode
    #[arg(long, default_value = "8080")]
    api_port: u16,

    /// Also append JSON logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(fmt::layer().json().with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    let settings = Settings::load(&args.config)?;
    let credentials = Credentials::load(&args.credentials)?;
    info!(
        edge_nodes = settings.edge_nodes.len(),
        clusters = settings.edge_clusters.len(),
        vrops = %settings.vrops_instance.ip,
        "Agent configured"
    );

    let logger = StructuredLogger::new(settings.vrops_instance.ip.clone());
    let mode = if args.interval_secs.is_some() { "daemon" } else { "oneshot" };
    logger.log_startup(AGENT_VERSION, mode);

    let client = VropsClient::new(ClientConfig::from_settings(&settings.vrops_instance))
        .context("failed to build vROps client")?;
    client
        .login(&credentials.vrops_instance)
        .await
        .context("failed to acquire vROps token")?;

    let transport = SshTransport::new(&credentials, settings.collection.connect_timeout());
    let pipeline = StatsPipeline::new(Arc::new(transport), Arc::new(client), &settings);

    match args.interval_secs {
        None => {
            let report = pipeline.run_and_notify().await?;
            info!(
                resources = report.resources,
                records = report.records,
                "Stats collected and published"
            );
            logger.log_shutdown("cycle complete");
            Ok(())
        }
        Some(interval) => run_daemon(pipeline, interval, args.api_port, &logger).await,
    }
}

async fn run_daemon(
    pipeline: StatsPipeline,
    interval_secs: u64,
    api_port: u16,
    logger: &StructuredLogger,
) -> Result<()> {
    let health_registry = HealthRegistry::for_pipeline().await;
    let pipeline = pipeline.with_health(health_registry.clone());

    let app_state = Arc::new(api::AppState::new(health_registry, PipelineMetrics::new()));
    let api_handle = tokio::spawn(api::serve(api_port, app_state));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already logged and notified
                if let Ok(report) = pipeline.run_and_notify().await {
                    if !report.edge_fallbacks.is_empty() || !report.esxi_fallbacks.is_empty() {
                        warn!(
                            edge = ?report.edge_fallbacks,
                            esxi = ?report.esxi_fallbacks,
                            "Hosts reported with fallback stats"
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                break;
            }
        }
    }

    api_handle.abort();
    if let Err(e) = api_handle.await {
        if !e.is_cancelled() {
            error!(error = %e, "API server task failed");
        }
    }

    info!("Shutting down");
    Ok(())
}
