//! Active workload discovery through the Kubernetes API

use crate::models::Workload;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

/// Excludes pods that have finished running
pub const ACTIVE_POD_SELECTOR: &str = "status.phase!=Succeeded,status.phase!=Failed";

/// List active pods, cluster-wide when `namespace` is `None`
pub async fn list_active_workloads(
    client: &Client,
    namespace: Option<&str>,
    field_selector: Option<&str>,
) -> Result<Vec<Workload>> {
    let pods: Api<Pod> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let selector = active_selector(field_selector);
    let list = pods
        .list(&ListParams::default().fields(&selector))
        .await
        .with_context(|| format!("Failed to list pods (fields: {})", selector))?;

    let workloads: Vec<Workload> = list.items.iter().filter_map(workload_from_pod).collect();
    debug!(count = workloads.len(), "Found active pods");
    Ok(workloads)
}

/// Name of the first pod in `namespace` running a container named `container`
pub async fn find_metrics_backend_pod(
    client: &Client,
    namespace: &str,
    container: &str,
) -> Result<String> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods
        .list(&ListParams::default().fields(ACTIVE_POD_SELECTOR))
        .await
        .with_context(|| format!("Failed to list pods in namespace {}", namespace))?;

    select_backend_pod(&list.items, container).with_context(|| {
        format!(
            "no pod with container {} found in namespace {}",
            container, namespace
        )
    })
}

fn active_selector(extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("{},{}", ACTIVE_POD_SELECTOR, extra),
        None => ACTIVE_POD_SELECTOR.to_string(),
    }
}

/// Pods without a name or spec carry nothing to measure
pub fn workload_from_pod(pod: &Pod) -> Option<Workload> {
    let name = pod.metadata.name.clone()?;
    let spec = pod.spec.as_ref()?;

    Some(Workload {
        name,
        uid: pod.metadata.uid.clone().unwrap_or_default(),
        containers: spec.containers.iter().map(|c| c.name.clone()).collect(),
    })
}

pub fn select_backend_pod(pods: &[Pod], container: &str) -> Option<String> {
    pods.iter()
        .find(|pod| {
            pod.spec
                .as_ref()
                .map(|spec| spec.containers.iter().any(|c| c.name == container))
                .unwrap_or(false)
        })
        .and_then(|pod| pod.metadata.name.clone())
}
