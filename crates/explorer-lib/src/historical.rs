//! End-to-end historical run against a cluster
//!
//! Locates the metrics backend pod, tunnels to it, enumerates active
//! workloads and drives the fetch pipeline through the tunnel.

use crate::config::ExplorerConfig;
use crate::models::{HistoricalReport, MetricKind};
use crate::observability::Diagnostics;
use crate::pipeline::HistoricalPipeline;
use crate::query::PrometheusClient;
use crate::tunnel::{open_tunnel, KubePortForwarder};
use crate::workloads::{find_metrics_backend_pod, list_active_workloads};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What to measure in a historical run
#[derive(Debug, Clone)]
pub struct HistoricalRequest {
    /// Namespace to inspect, all namespaces when `None`
    pub namespace: Option<String>,
    /// Extra field selector for pod enumeration
    pub field_selector: Option<String>,
    pub duration: Duration,
    pub kind: MetricKind,
}

/// Run one fetch-and-summarize pass.
///
/// Setup failures (backend pod lookup, tunnel, pod listing) abort the run.
/// Per-container query failures only shorten the report.
pub async fn run_historical(
    client: Client,
    config: &ExplorerConfig,
    request: &HistoricalRequest,
    diagnostics: Arc<Diagnostics>,
) -> Result<HistoricalReport> {
    let backend_pod = find_metrics_backend_pod(
        &client,
        &config.prometheus_namespace,
        &config.prometheus_container,
    )
    .await?;
    info!(
        pod = %backend_pod,
        namespace = %config.prometheus_namespace,
        "Using metrics backend pod"
    );

    let forwarder =
        KubePortForwarder::new(client.clone(), &config.prometheus_namespace, &backend_pod);
    let tunnel = open_tunnel(forwarder, config.remote_port, diagnostics.clone())
        .await
        .context("Error starting metrics backend port-forward")?;

    let result = fetch_through(&tunnel.base_url(), client, config, request, diagnostics).await;
    tunnel.close().await;
    result
}

async fn fetch_through(
    base_url: &str,
    client: Client,
    config: &ExplorerConfig,
    request: &HistoricalRequest,
    diagnostics: Arc<Diagnostics>,
) -> Result<HistoricalReport> {
    let source = PrometheusClient::new(base_url, config.query_timeout(), diagnostics.clone())?
        .with_step(config.query_step());

    let workloads = list_active_workloads(
        &client,
        request.namespace.as_deref(),
        request.field_selector.as_deref(),
    )
    .await?;
    info!(count = workloads.len(), "Found active pods");

    let pipeline = HistoricalPipeline::new(Arc::new(source), diagnostics, config.pipeline());
    Ok(pipeline
        .run(workloads, request.duration, request.kind)
        .await)
}
