//! Summary statistics over raw range-query results
//!
//! Memory is a gauge: statistics are taken over the sample values directly.
//! CPU is a cumulative seconds counter: statistics are taken over the
//! per-interval rates (millicores) between adjacent samples of each series.
//!
//! Samples are ordered by timestamp before anything is extracted, so "last"
//! always refers to the chronologically latest point regardless of the order
//! the backend returned them in. Non-finite values are discarded.
//!
//! A counter reset (value drops between two samples) yields a negative rate.
//! It is kept unclamped so the pool reflects exactly what the counter did.

use crate::models::{ContainerMetrics, FetchJob, MetricKind, MetricSummary, RawSeries, Sample};
use crate::resource::{CpuResource, MemoryResource};

const MILLIS_PER_SECOND: f64 = 1000.0;

/// Evaluate a raw result for the job's metric kind.
///
/// Returns `None` when no usable data point exists. "No record" means
/// "no data", never "zero usage".
pub fn evaluate(raw: &RawSeries, job: &FetchJob) -> Option<ContainerMetrics> {
    let (summary, data_points) = match job.kind {
        MetricKind::Memory => evaluate_memory(raw)?,
        MetricKind::Cpu => evaluate_cpu(raw)?,
    };

    Some(ContainerMetrics {
        container_name: job.container_name.clone(),
        pod_name: job.pod_name.clone(),
        summary,
        data_points,
    })
}

/// Gauge statistics over every value of every series
pub fn evaluate_memory(raw: &RawSeries) -> Option<(MetricSummary, u64)> {
    let mut points: Vec<Sample> = raw
        .series
        .iter()
        .flat_map(|s| s.samples.iter().copied())
        .filter(|s| s.value.is_finite())
        .collect();

    if points.is_empty() {
        return None;
    }

    // Stable: equal timestamps keep input order, so the later series wins "last".
    points.sort_by_key(|s| s.timestamp_ms);

    let values: Vec<i64> = points.iter().map(|s| s.value as i64).collect();
    let (min, max) = min_max(&values)?;
    let last = *values.last()?;

    Some((
        MetricSummary::Memory {
            last: MemoryResource::new(last),
            min: MemoryResource::new(min),
            max: MemoryResource::new(max),
        },
        values.len() as u64,
    ))
}

/// Rate statistics over every adjacent sample pair of every series
pub fn evaluate_cpu(raw: &RawSeries) -> Option<(MetricSummary, u64)> {
    let mut rates: Vec<Sample> = raw
        .series
        .iter()
        .flat_map(|s| series_rates(&s.samples))
        .collect();

    if rates.is_empty() {
        return None;
    }

    rates.sort_by_key(|r| r.timestamp_ms);

    let values: Vec<i64> = rates.iter().map(|r| r.value as i64).collect();
    let (min, max) = min_max(&values)?;
    let avg = average(&values)?;
    let last = *values.last()?;

    Some((
        MetricSummary::Cpu {
            last: CpuResource::new(last),
            min: CpuResource::new(min),
            max: CpuResource::new(max),
            avg: CpuResource::new(avg),
        },
        values.len() as u64,
    ))
}

/// Millicore rates of one counter series, each stamped with the later
/// sample's timestamp. Values are already truncated toward zero.
///
/// Pairs with a zero or negative interval are skipped.
pub fn series_rates(samples: &[Sample]) -> Vec<Sample> {
    let mut ordered: Vec<Sample> = samples
        .iter()
        .copied()
        .filter(|s| s.value.is_finite())
        .collect();
    ordered.sort_by_key(|s| s.timestamp_ms);

    ordered
        .windows(2)
        .filter_map(|pair| {
            let (prev, cur) = (pair[0], pair[1]);
            let interval_ms = cur.timestamp_ms - prev.timestamp_ms;
            if interval_ms <= 0 {
                return None;
            }
            let interval_secs = interval_ms as f64 / MILLIS_PER_SECOND;
            let delta = cur.value - prev.value;
            let rate = ((delta / interval_secs) * MILLIS_PER_SECOND) as i64;
            Some(Sample::new(cur.timestamp_ms, rate as f64))
        })
        .collect()
}

fn min_max(values: &[i64]) -> Option<(i64, i64)> {
    let min = *values.iter().min()?;
    let max = *values.iter().max()?;
    Some((min, max))
}

/// Integer mean, truncated toward zero
fn average(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let sum: i128 = values.iter().map(|v| *v as i128).sum();
    Some((sum / values.len() as i128) as i64)
}
