//! Edge stats CLI
//!
//! Operator tool for the edge and ESXi stats pipeline: inspect live stats,
//! preview the metrics a cycle would publish, and flatten saved documents.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{collect, metrics, Context};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Edge stats CLI
#[derive(Parser)]
#[command(name = "edgestats")]
#[command(author, version, about = "CLI for the edge and ESXi stats pipeline", long_about = None)]
pub struct Cli {
    /// Collection settings
    #[arg(long, short, env = "EDGESTATS_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Host and backend logins
    #[arg(long, env = "EDGESTATS_CREDENTIALS", default_value = "credentials.yaml")]
    pub credentials: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect and show stats of every edge node
    Edge,

    /// Collect and show NIC thread stats of an edge cluster's ESXi hosts
    Esxi {
        /// Edge cluster id (defaults to the configured cluster)
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Collect everything and show the metrics a cycle would publish
    Preview {
        /// Edge cluster id (defaults to the configured cluster)
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Flatten a saved stats document into metric records
    Flatten {
        /// JSON document produced by `edge --format json` or `esxi --format json`
        file: PathBuf,

        /// Kind of document
        #[arg(long, value_enum)]
        kind: metrics::StatsKind,

        /// Thread usage percentage counted as overloaded
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Flatten {
            file,
            kind,
            threshold,
        } => {
            metrics::flatten_file(&file, kind, threshold, cli.format)?;
        }
        Commands::Edge => {
            let ctx = Context::load(&cli.config, &cli.credentials)?;
            collect::show_edge(&ctx, cli.format).await?;
        }
        Commands::Esxi { cluster } => {
            let ctx = Context::load(&cli.config, &cli.credentials)?;
            collect::show_esxi(&ctx, cluster, cli.format).await?;
        }
        Commands::Preview { cluster } => {
            let ctx = Context::load(&cli.config, &cli.credentials)?;
            metrics::preview(&ctx, cluster, cli.format).await?;
        }
    }

    Ok(())
}
