//! Core data models for the historical metrics pipeline

use crate::resource::{CpuResource, MemoryResource};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which resource a historical run measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative CPU seconds counter, evaluated as rates
    Cpu,
    /// Memory usage gauge in bytes
    Memory,
}

impl MetricKind {
    /// Name of the backing cAdvisor series
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "container_cpu_usage_seconds_total",
            MetricKind::Memory => "container_memory_usage_bytes",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Cpu => f.write_str("cpu"),
            MetricKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(MetricKind::Cpu),
            "mem" | "memory" => Ok(MetricKind::Memory),
            other => anyhow::bail!("unknown metric kind '{}', expected cpu or memory", other),
        }
    }
}

/// An active pod and the containers to measure in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub uid: String,
    pub containers: Vec<String>,
}

/// One (container, pod) pair to fetch and evaluate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub container_name: String,
    pub pod_name: String,
    pub pod_uid: String,
    pub duration: Duration,
    pub kind: MetricKind,
}

/// A single time-stamped sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Samples of one label set returned by a range query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

/// Every series returned by a single range query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub series: Vec<Series>,
}

impl RawSeries {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    /// Total sample count across all series
    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|s| s.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }
}

/// Derived statistics, shaped by the metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricSummary {
    Cpu {
        last: CpuResource,
        min: CpuResource,
        max: CpuResource,
        avg: CpuResource,
    },
    /// Gauges have no meaningful average. The sample count lives beside the
    /// summary in `ContainerMetrics::data_points`.
    Memory {
        last: MemoryResource,
        min: MemoryResource,
        max: MemoryResource,
    },
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Cpu { .. } => MetricKind::Cpu,
            MetricSummary::Memory { .. } => MetricKind::Memory,
        }
    }

    /// Raw (last, min, max) magnitudes for sorting
    fn magnitudes(&self) -> (i64, i64, i64) {
        match self {
            MetricSummary::Cpu { last, min, max, .. } => (last.value(), min.value(), max.value()),
            MetricSummary::Memory { last, min, max } => (last.value(), min.value(), max.value()),
        }
    }

    /// Average magnitude; memory has no average so its last value stands in
    fn average(&self) -> i64 {
        match self {
            MetricSummary::Cpu { avg, .. } => avg.value(),
            MetricSummary::Memory { last, .. } => last.value(),
        }
    }
}

/// Per-container historical statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub container_name: String,
    pub pod_name: String,
    #[serde(flatten)]
    pub summary: MetricSummary,
    /// Usable points the summary was computed from
    pub data_points: u64,
}

impl ContainerMetrics {
    pub fn kind(&self) -> MetricKind {
        self.summary.kind()
    }
}

/// Field a report can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Container,
    Pod,
    Last,
    Min,
    Max,
    Avg,
    DataPoints,
}

impl FromStr for SortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "container" | "name" => Ok(SortField::Container),
            "pod" => Ok(SortField::Pod),
            "last" => Ok(SortField::Last),
            "min" => Ok(SortField::Min),
            "max" => Ok(SortField::Max),
            "avg" | "average" => Ok(SortField::Avg),
            "datapoints" | "points" => Ok(SortField::DataPoints),
            other => anyhow::bail!(
                "'{}' is not a valid field. Possible values are: container, pod, last, min, max, avg, datapoints",
                other
            ),
        }
    }
}

/// Result of one historical run, handed to the rendering layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalReport {
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub kind: MetricKind,
    pub metrics: Vec<ContainerMetrics>,
}

impl HistoricalReport {
    /// Total data points across every record
    pub fn data_points(&self) -> u64 {
        self.metrics.iter().map(|m| m.data_points).sum()
    }

    /// Order records in place; the pipeline itself gives no ordering guarantee
    pub fn sort_by(&mut self, field: SortField, reverse: bool) {
        self.metrics.sort_by(|a, b| {
            let ordering = compare(a, b, field);
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

fn compare(a: &ContainerMetrics, b: &ContainerMetrics, field: SortField) -> Ordering {
    let (a_last, a_min, a_max) = a.summary.magnitudes();
    let (b_last, b_min, b_max) = b.summary.magnitudes();

    let primary = match field {
        SortField::Container => a.container_name.cmp(&b.container_name),
        SortField::Pod => a.pod_name.cmp(&b.pod_name),
        SortField::Last => a_last.cmp(&b_last),
        SortField::Min => a_min.cmp(&b_min),
        SortField::Max => a_max.cmp(&b_max),
        SortField::Avg => a.summary.average().cmp(&b.summary.average()),
        SortField::DataPoints => a.data_points.cmp(&b.data_points),
    };

    primary
        .then_with(|| a.pod_name.cmp(&b.pod_name))
        .then_with(|| a.container_name.cmp(&b.container_name))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
