//! Historical usage command

use anyhow::{Context, Result};
use colored::Colorize;
use explorer_lib::{
    run_historical, Diagnostics, ExplorerConfig, HistoricalRequest, MetricKind, SortField,
};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::output::{print_report, print_warning, OutputFormat};

/// Parsed `historical` arguments
pub struct HistoricalArgs {
    pub metric: MetricKind,
    pub namespace: Option<String>,
    pub field_selector: Option<String>,
    pub duration: Duration,
    pub sort: SortField,
    pub reverse: bool,
    pub prometheus_namespace: Option<String>,
    pub prometheus_container: Option<String>,
    pub workers: Option<usize>,
}

/// Reject argument combinations that cannot produce a meaningful report
pub fn validate(args: &HistoricalArgs) -> Result<()> {
    anyhow::ensure!(
        !(args.metric == MetricKind::Memory && args.sort == SortField::Avg),
        "memory summaries have no average; sort by last, min, max, container, pod or datapoints"
    );
    Ok(())
}

/// Apply command-line overrides on top of the environment configuration
fn resolve_config(args: &HistoricalArgs) -> Result<ExplorerConfig> {
    let mut config = ExplorerConfig::load()?;
    if let Some(ns) = &args.prometheus_namespace {
        config.prometheus_namespace = ns.clone();
    }
    if let Some(container) = &args.prometheus_container {
        config.prometheus_container = container.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

/// Fetch, summarize and print historical usage
pub async fn show_historical(
    client: Client,
    args: HistoricalArgs,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = resolve_config(&args)?;
    debug!(
        prometheus_namespace = %config.prometheus_namespace,
        prometheus_container = %config.prometheus_container,
        workers = config.workers,
        "Resolved configuration"
    );
    let diagnostics = Arc::new(
        Diagnostics::new(format!("historical-{}", args.metric))
            .context("Failed to create diagnostics registry")?,
    );

    let request = HistoricalRequest {
        namespace: args.namespace.clone(),
        field_selector: args.field_selector.clone(),
        duration: args.duration,
        kind: args.metric,
    };

    let mut report = run_historical(client, &config, &request, diagnostics.clone()).await?;
    report.sort_by(args.sort, args.reverse);

    print_report(&report, format, args.namespace.as_deref())?;

    let summary = diagnostics.summary();
    if format == OutputFormat::Table && summary.jobs_dropped > 0 {
        print_warning(&format!(
            "{} of {} containers returned no usable data",
            summary.jobs_dropped, summary.jobs_enqueued
        ));
    }

    if verbose {
        eprintln!();
        eprintln!("{}", "Diagnostics".bold());
        eprintln!("{}", "-".repeat(50));
        eprint!("{}", diagnostics.render());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> HistoricalArgs {
        HistoricalArgs {
            metric: MetricKind::Cpu,
            namespace: None,
            field_selector: None,
            duration: Duration::from_secs(3600),
            sort: SortField::Max,
            reverse: false,
            prometheus_namespace: Some("observability".to_string()),
            prometheus_container: None,
            workers: Some(12),
        }
    }

    #[test]
    fn test_validate_rejects_memory_average_sort() {
        let mut args = args();
        assert!(validate(&args).is_ok());

        args.metric = MetricKind::Memory;
        args.sort = SortField::Avg;
        let err = validate(&args).unwrap_err();
        assert!(err.to_string().contains("no average"));

        args.sort = SortField::Last;
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let config = resolve_config(&args()).unwrap();
        assert_eq!(config.prometheus_namespace, "observability");
        assert_eq!(config.workers, 12);
        assert_eq!(config.remote_port, 9090);
    }
}
