//! Kube Resource Explorer CLI
//!
//! Shows historical CPU and memory usage of the containers running in a
//! cluster, computed from the in-cluster Prometheus through a port-forward.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::historical;
use explorer_lib::{MetricKind, SortField};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Kube Resource Explorer
#[derive(Parser)]
#[command(name = "kube-resource-explorer")]
#[command(author, version, about = "Historical container resource usage for Kubernetes", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Select k8s context
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show historical usage statistics from Prometheus
    Historical {
        /// Metric to evaluate (cpu or memory)
        #[arg(long, short, value_parser = config::parse_metric_kind)]
        metric: MetricKind,

        /// Filter by namespace (defaults to all)
        #[arg(long, short)]
        namespace: Option<String>,

        /// Additional pod field selector
        #[arg(long)]
        field_selector: Option<String>,

        /// How far back to look (e.g. 30m, 4h, 1h30m, 7d)
        #[arg(long, short, default_value = "4h", value_parser = config::parse_duration)]
        duration: Duration,

        /// Field to sort by (container, pod, last, min, max, avg, datapoints); avg is cpu only
        #[arg(long, short, default_value = "max", value_parser = config::parse_sort_field)]
        sort: SortField,

        /// Reverse sort output
        #[arg(long, short)]
        reverse: bool,

        /// Namespace running Prometheus
        #[arg(long, env = "KRE_PROMETHEUS_NAMESPACE")]
        prometheus_namespace: Option<String>,

        /// Container name identifying the Prometheus pod
        #[arg(long, env = "KRE_PROMETHEUS_CONTAINER")]
        prometheus_container: Option<String>,

        /// Concurrent query workers
        #[arg(long, env = "KRE_WORKERS")]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Historical {
            metric,
            namespace,
            field_selector,
            duration,
            sort,
            reverse,
            prometheus_namespace,
            prometheus_container,
            workers,
        } => {
            let args = historical::HistoricalArgs {
                metric,
                namespace,
                field_selector,
                duration,
                sort,
                reverse,
                prometheus_namespace,
                prometheus_container,
                workers,
            };
            historical::validate(&args)?;

            let client = config::kube_client(cli.kubeconfig.as_deref(), cli.context).await?;
            historical::show_historical(client, args, cli.format, cli.verbose).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
