//! Diagnostics for a historical run
//!
//! Provides:
//! - Per-run Prometheus counters (jobs, drops, query errors, backend warnings)
//! - Structured event logging with tracing
//!
//! A `Diagnostics` is constructed by the caller and passed in explicitly.
//! Its registry is private to the instance, so independent runs (and tests)
//! never share counters.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for range query latency (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSummary {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_dropped: u64,
    pub query_errors: u64,
    pub backend_warnings: u64,
}

/// Explicit diagnostics sink shared by the tunnel, query client and pipeline
pub struct Diagnostics {
    run: String,
    registry: Registry,
    jobs_enqueued: IntCounter,
    jobs_completed: IntCounter,
    jobs_dropped: IntCounter,
    query_errors: IntCounter,
    backend_warnings: IntCounter,
    query_duration_seconds: Histogram,
}

impl Diagnostics {
    /// Create a sink whose events are tagged with `run`
    pub fn new(run: impl Into<String>) -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("kube_resource_explorer".to_string()), None)?;

        let jobs_enqueued = IntCounter::new("jobs_enqueued_total", "Fetch jobs handed to workers")?;
        let jobs_completed =
            IntCounter::new("jobs_completed_total", "Fetch jobs that produced a record")?;
        let jobs_dropped =
            IntCounter::new("jobs_dropped_total", "Fetch jobs that yielded no usable data")?;
        let query_errors =
            IntCounter::new("query_errors_total", "Range queries that failed and were absorbed")?;
        let backend_warnings =
            IntCounter::new("backend_warnings_total", "Warnings reported by the metrics backend")?;
        let query_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("query_duration_seconds", "Range query round trip time")
                .buckets(QUERY_LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(jobs_enqueued.clone()))?;
        registry.register(Box::new(jobs_completed.clone()))?;
        registry.register(Box::new(jobs_dropped.clone()))?;
        registry.register(Box::new(query_errors.clone()))?;
        registry.register(Box::new(backend_warnings.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        Ok(Self {
            run: run.into(),
            registry,
            jobs_enqueued,
            jobs_completed,
            jobs_dropped,
            query_errors,
            backend_warnings,
            query_duration_seconds,
        })
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Log that a tunnel became reachable
    pub fn log_tunnel_ready(&self, local_addr: &str, remote_port: u16) {
        info!(
            event = "tunnel_ready",
            run = %self.run,
            local_addr = %local_addr,
            remote_port = remote_port,
            "Port forward ready"
        );
    }

    /// Log that a tunnel could not be established
    pub fn log_tunnel_failed(&self, error: &dyn std::error::Error) {
        warn!(
            event = "tunnel_failed",
            run = %self.run,
            error = %error,
            "Port forward failed"
        );
    }

    pub fn record_job_enqueued(&self) {
        self.jobs_enqueued.inc();
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.inc();
    }

    /// Record a job that produced no record
    pub fn record_job_dropped(&self, container: &str, pod: &str) {
        self.jobs_dropped.inc();
        debug!(
            event = "job_dropped",
            run = %self.run,
            container = %container,
            pod = %pod,
            "No usable data points, skipping container"
        );
    }

    pub fn observe_query(&self, elapsed: Duration) {
        self.query_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Record a failed range query that was absorbed as "no data"
    pub fn record_query_error(&self, query: &str, error: &dyn std::error::Error) {
        self.query_errors.inc();
        warn!(
            event = "query_failed",
            run = %self.run,
            query = %query,
            error = %error,
            "Range query failed, treating as no data"
        );
    }

    /// Surface non-fatal backend warnings
    pub fn record_backend_warnings(&self, query: &str, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        self.backend_warnings.inc_by(warnings.len() as u64);
        warn!(
            event = "backend_warnings",
            run = %self.run,
            query = %query,
            warnings = ?warnings,
            "Metrics backend returned warnings"
        );
    }

    /// Log the end of a pipeline pass
    pub fn log_pipeline_finished(&self, records: usize, elapsed: Duration) {
        let summary = self.summary();
        info!(
            event = "pipeline_finished",
            run = %self.run,
            records = records,
            jobs = summary.jobs_enqueued,
            dropped = summary.jobs_dropped,
            query_errors = summary.query_errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Historical fetch complete"
        );
    }

    pub fn summary(&self) -> DiagnosticsSummary {
        DiagnosticsSummary {
            jobs_enqueued: self.jobs_enqueued.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_dropped: self.jobs_dropped.get(),
            query_errors: self.query_errors.get(),
            backend_warnings: self.backend_warnings.get(),
        }
    }

    /// Prometheus text exposition of this run's counters
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode diagnostics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
