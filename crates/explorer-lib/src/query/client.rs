//! HTTP client for the Prometheus range query API

use super::response::{matrix_to_series, ApiResponse, MatrixEntry};
use super::{async_trait, MetricsSource};
use crate::models::RawSeries;
use crate::observability::Diagnostics;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Range query resolution
pub const DEFAULT_STEP: Duration = Duration::from_secs(60);

const QUERY_RANGE_PATH: &str = "api/v1/query_range";

/// Why a range query produced no result
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("requested duration {0:?} is out of range")]
    InvalidRange(Duration),

    #[error("request to metrics backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics backend responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("metrics backend error ({error_type}): {message}")]
    Backend { error_type: String, message: String },

    #[error("could not decode metrics backend response: {0}")]
    Decode(String),

    #[error("expected a matrix result, got '{0}'")]
    UnexpectedResultType(String),
}

/// Successful range query outcome
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub series: RawSeries,
    pub warnings: Vec<String>,
}

/// Range query client for a Prometheus-compatible backend
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
    step: Duration,
    diagnostics: Arc<Diagnostics>,
}

impl PrometheusClient {
    /// Create a client for the backend at `base_url` (e.g. a tunnel address)
    pub fn new(
        base_url: &str,
        timeout: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(base_url).context("Invalid metrics backend URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            step: DEFAULT_STEP,
            diagnostics,
        })
    }

    /// Override the query resolution step
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Run `query` over `[start, end]` and return every matrix series
    pub async fn try_query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QueryResult, QueryError> {
        let url = self
            .base_url
            .join(QUERY_RANGE_PATH)
            .map_err(|e| QueryError::Decode(e.to_string()))?;

        let params = [
            ("query", query.to_string()),
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
            ("step", self.step.as_secs().max(1).to_string()),
        ];

        let started = Instant::now();
        let response = self.client.get(url).query(&params).send().await;
        self.diagnostics.observe_query(started.elapsed());

        let response = response?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports query errors as JSON on non-2xx codes too.
        let envelope: ApiResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(QueryError::Decode(e.to_string())),
            Err(_) => {
                return Err(QueryError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if envelope.status != "success" {
            return Err(QueryError::Backend {
                error_type: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: envelope.error.unwrap_or_default(),
            });
        }

        let data = envelope
            .data
            .ok_or_else(|| QueryError::Decode("missing data field".to_string()))?;

        if data.result_type != "matrix" {
            return Err(QueryError::UnexpectedResultType(data.result_type));
        }

        let entries: Vec<MatrixEntry> =
            serde_json::from_value(data.result).map_err(|e| QueryError::Decode(e.to_string()))?;
        let series = matrix_to_series(entries).map_err(QueryError::Decode)?;

        Ok(QueryResult {
            series,
            warnings: envelope.warnings,
        })
    }

    async fn fetch(&self, query: &str, duration: Duration) -> Result<QueryResult, QueryError> {
        let span = chrono::Duration::from_std(duration)
            .map_err(|_| QueryError::InvalidRange(duration))?;
        let end = Utc::now();
        let start = end
            .checked_sub_signed(span)
            .ok_or(QueryError::InvalidRange(duration))?;

        self.try_query_range(query, start, end).await
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query_range(
        &self,
        metric: &str,
        container: &str,
        pod: &str,
        duration: Duration,
    ) -> RawSeries {
        let query = selector(metric, container, pod);

        match self.fetch(&query, duration).await {
            Ok(result) => {
                self.diagnostics
                    .record_backend_warnings(&query, &result.warnings);
                debug!(
                    query = %query,
                    series = result.series.series.len(),
                    samples = result.series.sample_count(),
                    "Range query complete"
                );
                result.series
            }
            Err(e) => {
                self.diagnostics.record_query_error(&query, &e);
                RawSeries::default()
            }
        }
    }
}

/// `metric{container="...", pod="..."}` with label values escaped
pub fn selector(metric: &str, container: &str, pod: &str) -> String {
    format!(
        "{}{{container=\"{}\", pod=\"{}\"}}",
        metric,
        escape_label(container),
        escape_label(pod)
    )
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unix_seconds(at: DateTime<Utc>) -> String {
    format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn diagnostics() -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new("query-test").unwrap())
    }

    const MATRIX_BODY: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [
                {
                    "metric": {"container": "app", "pod": "app-1", "instance": "node-a"},
                    "values": [[1700000000, "100"], [1700000060, "300"], [1700000120, "200"]]
                },
                {
                    "metric": {"container": "app", "pod": "app-1", "instance": "node-b"},
                    "values": [[1700000000, "50"]]
                }
            ]
        }
    }"#;

    #[test]
    fn test_selector_escapes_labels() {
        assert_eq!(
            selector("container_memory_usage_bytes", "app", "app-1"),
            "container_memory_usage_bytes{container=\"app\", pod=\"app-1\"}"
        );
        assert_eq!(
            selector("m", "a\"b", "c\\d"),
            "m{container=\"a\\\"b\", pod=\"c\\\\d\"}"
        );
    }

    #[test]
    fn test_unix_seconds_keeps_millis() {
        let at = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(unix_seconds(at), "1700000000.250");
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client =
            PrometheusClient::new("http://localhost:9090/prom", Duration::from_secs(1), diagnostics())
                .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:9090/prom/");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(PrometheusClient::new("not a url", Duration::from_secs(1), diagnostics()).is_err());
    }

    #[tokio::test]
    async fn test_query_range_returns_all_series() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "query".into(),
                    "container_memory_usage_bytes{container=\"app\", pod=\"app-1\"}".into(),
                ),
                Matcher::UrlEncoded("step".into(), "60".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MATRIX_BODY)
            .create_async()
            .await;

        let diagnostics = diagnostics();
        let client =
            PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics.clone())
                .unwrap();
        let raw = client
            .query_range(
                "container_memory_usage_bytes",
                "app",
                "app-1",
                Duration::from_secs(3600),
            )
            .await;

        mock.assert_async().await;
        assert_eq!(raw.series.len(), 2);
        assert_eq!(raw.sample_count(), 4);
        assert_eq!(raw.series[0].samples[2].value, 200.0);
        assert_eq!(raw.series[0].samples[2].timestamp_ms, 1_700_000_120_000);
        assert_eq!(diagnostics.summary().query_errors, 0);
    }

    #[tokio::test]
    async fn test_custom_step_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::UrlEncoded("step".into(), "30".into()))
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics())
            .unwrap()
            .with_step(Duration::from_secs(30));
        let raw = client
            .query_range("m", "c", "p", Duration::from_secs(600))
            .await;

        mock.assert_async().await;
        assert!(raw.is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_yields_empty_series() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"invalid parameter"}"#)
            .create_async()
            .await;

        let diagnostics = diagnostics();
        let client =
            PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics.clone())
                .unwrap();

        let err = client
            .try_query_range("m", Utc::now(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Backend { ref error_type, .. } if error_type == "bad_data"));

        let raw = client
            .query_range("m", "c", "p", Duration::from_secs(60))
            .await;
        assert!(raw.is_empty());
        assert_eq!(diagnostics.summary().query_errors, 1);
    }

    #[tokio::test]
    async fn test_non_json_error_maps_to_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("service unavailable")
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics())
            .unwrap();
        let err = client
            .try_query_range("m", Utc::now(), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_non_matrix_result_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
            .create_async()
            .await;

        let client = PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics())
            .unwrap();
        let err = client
            .try_query_range("m", Utc::now(), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::UnexpectedResultType(ref t) if t == "vector"));
    }

    #[tokio::test]
    async fn test_warnings_are_diagnostics_not_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"status":"success","warnings":["partial response"],
                    "data":{"resultType":"matrix","result":[{"metric":{},"values":[[1,"5"]]}]}}"#,
            )
            .create_async()
            .await;

        let diagnostics = diagnostics();
        let client =
            PrometheusClient::new(&server.url(), Duration::from_secs(5), diagnostics.clone())
                .unwrap();
        let raw = client
            .query_range("m", "c", "p", Duration::from_secs(60))
            .await;

        assert_eq!(raw.sample_count(), 1);
        assert_eq!(diagnostics.summary().backend_warnings, 1);
        assert_eq!(diagnostics.summary().query_errors, 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_yields_empty_series() {
        // Bind then release a port so nothing is listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let diagnostics = diagnostics();
        let client = PrometheusClient::new(
            &format!("http://127.0.0.1:{}", port),
            Duration::from_secs(2),
            diagnostics.clone(),
        )
        .unwrap();

        let raw = client
            .query_range("m", "c", "p", Duration::from_secs(60))
            .await;
        assert!(raw.is_empty());
        assert_eq!(diagnostics.summary().query_errors, 1);
    }
}
