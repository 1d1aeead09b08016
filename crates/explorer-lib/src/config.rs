//! Explorer configuration

use crate::pipeline::PipelineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Historical run configuration, read from `KRE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    /// Namespace running the metrics backend
    #[serde(default = "default_prometheus_namespace")]
    pub prometheus_namespace: String,

    /// Container name that identifies the metrics backend pod
    #[serde(default = "default_prometheus_container")]
    pub prometheus_container: String,

    /// Metrics backend port inside the pod
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    /// Range query resolution in seconds
    #[serde(default = "default_query_step")]
    pub query_step_secs: u64,

    /// HTTP timeout per range query in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bound of the job and result queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_prometheus_namespace() -> String {
    "monitoring".to_string()
}

fn default_prometheus_container() -> String {
    "prometheus".to_string()
}

fn default_remote_port() -> u16 {
    crate::tunnel::DEFAULT_REMOTE_PORT
}

fn default_query_step() -> u64 {
    60
}

fn default_query_timeout() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            prometheus_namespace: default_prometheus_namespace(),
            prometheus_container: default_prometheus_container(),
            remote_port: default_remote_port(),
            query_step_secs: default_query_step(),
            query_timeout_secs: default_query_timeout(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("KRE"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid KRE_* configuration")
    }

    pub fn query_step(&self) -> Duration {
        Duration::from_secs(self.query_step_secs.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.workers.max(1),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}
