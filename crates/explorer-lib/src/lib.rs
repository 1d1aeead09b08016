//! Historical container resource statistics for Kubernetes
//!
//! This crate provides the core functionality for:
//! - Tunnelling to the in-cluster metrics backend
//! - Range queries for per-container time series
//! - CPU rate and memory gauge statistics
//! - A bounded producer/worker/collector fetch pipeline
//! - Resource quantity formatting

pub mod config;
pub mod evaluator;
pub mod historical;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod resource;
pub mod tunnel;
pub mod workloads;

pub use config::ExplorerConfig;
pub use historical::{run_historical, HistoricalRequest};
pub use models::*;
pub use observability::{Diagnostics, DiagnosticsSummary};
pub use pipeline::{HistoricalPipeline, PipelineConfig};
pub use resource::{CpuResource, MemoryResource};
pub use tunnel::{open_tunnel, Tunnel, TunnelError, TunnelState};
