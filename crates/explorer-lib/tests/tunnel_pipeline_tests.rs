//! Integration tests running the fetch pipeline through a local tunnel

use async_trait::async_trait;
use explorer_lib::{
    open_tunnel,
    query::PrometheusClient,
    tunnel::{ForwardStream, PortForwarder, TunnelError},
    Diagnostics, HistoricalPipeline, MetricKind, MetricSummary, MemoryResource, PipelineConfig,
    TunnelState, Workload,
};
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Forwards every dial to a plain TCP address, standing in for the pod
struct TcpForwarder {
    addr: String,
}

#[async_trait]
impl PortForwarder for TcpForwarder {
    fn target(&self) -> String {
        self.addr.clone()
    }

    async fn dial(&self, _remote_port: u16) -> Result<Box<dyn ForwardStream>, TunnelError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TunnelError::Dial {
                target: self.addr.clone(),
                message: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }
}

const MEMORY_BODY: &str = r#"{
    "status": "success",
    "data": {
        "resultType": "matrix",
        "result": [
            {
                "metric": {"container": "c"},
                "values": [[1700000000, "100"], [1700000060, "300"], [1700000120, "200"]]
            }
        ]
    }
}"#;

fn workloads() -> Vec<Workload> {
    (0..3)
        .map(|i| Workload {
            name: format!("pod-{}", i),
            uid: format!("uid-{}", i),
            containers: vec!["app".to_string(), "sidecar".to_string()],
        })
        .collect()
}

#[tokio::test]
async fn test_pipeline_through_tunnel() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/query_range")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(MEMORY_BODY)
        .expect(6)
        .create_async()
        .await;

    let diagnostics = Arc::new(Diagnostics::new("integration").unwrap());
    let forwarder = TcpForwarder {
        addr: server.host_with_port(),
    };
    let tunnel = open_tunnel(forwarder, 9090, diagnostics.clone())
        .await
        .unwrap();
    assert_eq!(tunnel.state(), TunnelState::Ready);

    let source =
        PrometheusClient::new(&tunnel.base_url(), Duration::from_secs(5), diagnostics.clone())
            .unwrap();
    let pipeline = HistoricalPipeline::new(
        Arc::new(source),
        diagnostics.clone(),
        PipelineConfig {
            workers: 3,
            queue_capacity: 2,
        },
    );

    let report = pipeline
        .run(workloads(), Duration::from_secs(3600), MetricKind::Memory)
        .await;

    assert_eq!(report.metrics.len(), 6);
    assert_eq!(report.data_points(), 18);
    for record in &report.metrics {
        assert_eq!(
            record.summary,
            MetricSummary::Memory {
                last: MemoryResource::new(200),
                min: MemoryResource::new(100),
                max: MemoryResource::new(300),
            }
        );
    }

    let summary = diagnostics.summary();
    assert_eq!(summary.jobs_enqueued, 6);
    assert_eq!(summary.jobs_completed, 6);
    assert_eq!(summary.query_errors, 0);

    tunnel.close().await;
    mock.assert_async().await;
}

#[tokio::test]
async fn test_backend_errors_shorten_report() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v1/query_range")
        .match_query(Matcher::Any)
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"error","errorType":"execution","error":"query timed out"}"#)
        .create_async()
        .await;

    let diagnostics = Arc::new(Diagnostics::new("integration-errors").unwrap());
    let tunnel = open_tunnel(
        TcpForwarder {
            addr: server.host_with_port(),
        },
        9090,
        diagnostics.clone(),
    )
    .await
    .unwrap();

    let source =
        PrometheusClient::new(&tunnel.base_url(), Duration::from_secs(5), diagnostics.clone())
            .unwrap();
    let pipeline =
        HistoricalPipeline::new(Arc::new(source), diagnostics.clone(), PipelineConfig::default());

    let report = pipeline
        .run(workloads(), Duration::from_secs(600), MetricKind::Cpu)
        .await;

    assert!(report.metrics.is_empty());
    let summary = diagnostics.summary();
    assert_eq!(summary.query_errors, 6);
    assert_eq!(summary.jobs_dropped, 6);

    tunnel.close().await;
}

#[tokio::test]
async fn test_unreachable_pod_fails_tunnel_setup() {
    let diagnostics = Arc::new(Diagnostics::new("integration-unreachable").unwrap());
    let port = explorer_lib::tunnel::free_local_port().unwrap();
    let result = open_tunnel(
        TcpForwarder {
            addr: format!("127.0.0.1:{}", port),
        },
        9090,
        diagnostics,
    )
    .await;

    assert!(matches!(result, Err(TunnelError::Dial { .. })));
}
