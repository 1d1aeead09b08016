//! Prometheus HTTP API envelope

use crate::models::{RawSeries, Sample, Series};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<ResponseData>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseData {
    pub result_type: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatrixEntry {
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Convert matrix entries into series; fails on an unparseable value
pub(crate) fn matrix_to_series(entries: Vec<MatrixEntry>) -> Result<RawSeries, String> {
    let mut series = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut samples = Vec::with_capacity(entry.values.len());
        for (ts, raw_value) in entry.values {
            let value: f64 = raw_value
                .parse()
                .map_err(|_| format!("invalid sample value '{}'", raw_value))?;
            samples.push(Sample::new((ts * 1000.0).round() as i64, value));
        }
        series.push(Series::new(samples));
    }

    Ok(RawSeries::new(series))
}
