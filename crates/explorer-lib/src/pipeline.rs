//! Historical fetch pipeline
//!
//! A producer enqueues one `FetchJob` per (pod, container) pair onto a bounded
//! job queue and closes it. A pool of workers drains that queue, queries the
//! metrics source, evaluates the result and pushes records onto a bounded
//! result queue. A coordinator joins every worker before closing the result
//! queue, so the collector only stops once no worker can still send.
//!
//! Records arrive in completion order, not input order.

use crate::evaluator::evaluate;
use crate::models::{ContainerMetrics, FetchJob, HistoricalReport, MetricKind, Workload};
use crate::observability::Diagnostics;
use crate::query::MetricsSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Configuration for the fetch pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers (default: 4)
    pub workers: usize,
    /// Capacity of the job and result queues (default: 64)
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

/// Runs one bounded fetch-and-summarize pass
pub struct HistoricalPipeline {
    source: Arc<dyn MetricsSource>,
    diagnostics: Arc<Diagnostics>,
    config: PipelineConfig,
}

impl HistoricalPipeline {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        diagnostics: Arc<Diagnostics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            diagnostics,
            config,
        }
    }

    /// Fetch and evaluate `kind` for every container of every workload.
    ///
    /// Containers without usable data are missing from the report.
    pub async fn run(
        &self,
        workloads: Vec<Workload>,
        duration: Duration,
        kind: MetricKind,
    ) -> HistoricalReport {
        let started = Instant::now();
        let capacity = self.config.queue_capacity.max(1);
        let worker_count = self.config.workers.max(1);

        let (job_tx, job_rx) = mpsc::channel::<FetchJob>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<ContainerMetrics>(capacity);

        info!(
            workloads = workloads.len(),
            workers = worker_count,
            kind = %kind,
            duration_secs = duration.as_secs(),
            "Starting historical fetch"
        );

        let producer = tokio::spawn(produce(
            workloads,
            duration,
            kind,
            job_tx,
            self.diagnostics.clone(),
        ));

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(work(
                id,
                job_rx.clone(),
                result_tx.clone(),
                self.source.clone(),
                self.diagnostics.clone(),
            ));
        }

        // Barrier: the result queue closes only after every worker has exited.
        let coordinator = tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Fetch worker terminated abnormally");
                }
            }
            drop(result_tx);
        });

        let mut metrics = Vec::new();
        while let Some(record) = result_rx.recv().await {
            metrics.push(record);
        }

        if let Err(e) = coordinator.await {
            error!(error = %e, "Pipeline coordinator failed");
        }
        if let Err(e) = producer.await {
            error!(error = %e, "Job producer failed");
        }

        self.diagnostics
            .log_pipeline_finished(metrics.len(), started.elapsed());

        HistoricalReport {
            duration,
            kind,
            metrics,
        }
    }
}

/// Enqueue one job per (pod, container) pair, then close the job queue
async fn produce(
    workloads: Vec<Workload>,
    duration: Duration,
    kind: MetricKind,
    jobs: mpsc::Sender<FetchJob>,
    diagnostics: Arc<Diagnostics>,
) {
    for workload in workloads {
        for container in &workload.containers {
            let job = FetchJob {
                container_name: container.clone(),
                pod_name: workload.name.clone(),
                pod_uid: workload.uid.clone(),
                duration,
                kind,
            };
            if jobs.send(job).await.is_err() {
                error!("Job queue closed before all jobs were enqueued");
                return;
            }
            diagnostics.record_job_enqueued();
        }
    }
    // Dropping the sender closes the queue.
}

async fn work(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<FetchJob>>>,
    results: mpsc::Sender<ContainerMetrics>,
    source: Arc<dyn MetricsSource>,
    diagnostics: Arc<Diagnostics>,
) {
    loop {
        // Hold the lock only while waiting for the next job.
        let next = jobs.lock().await.recv().await;
        let Some(job) = next else {
            debug!(worker = id, "Job queue drained, worker exiting");
            break;
        };

        let raw = source
            .query_range(
                job.kind.metric_name(),
                &job.container_name,
                &job.pod_name,
                job.duration,
            )
            .await;

        match evaluate(&raw, &job) {
            Some(record) => {
                diagnostics.record_job_completed();
                if results.send(record).await.is_err() {
                    error!(worker = id, "Result queue closed early");
                    break;
                }
            }
            None => diagnostics.record_job_dropped(&job.container_name, &job.pod_name),
        }
    }
}
