//! Range queries against the metrics backend
//!
//! The pipeline only sees the `MetricsSource` trait. `PrometheusClient`
//! implements it over the Prometheus HTTP API reached through the tunnel.

mod client;
mod response;

pub use client::{selector, PrometheusClient, QueryError, QueryResult, DEFAULT_STEP};

use crate::models::RawSeries;
use std::time::Duration;

pub use async_trait::async_trait;

/// Source of raw time series for one container
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch `metric` for a container over `[now - duration, now]`.
    ///
    /// Failures are absorbed: an unreachable or failing backend yields an
    /// empty `RawSeries`, indistinguishable from an idle container.
    async fn query_range(
        &self,
        metric: &str,
        container: &str,
        pod: &str,
        duration: Duration,
    ) -> RawSeries;
}
