//! Pipeline execution runtime
//!
//! This crate builds and validates node graphs and executes them: conditional
//! fan-out, join semantics, skip propagation, per-run params and debug capture.

mod context;
mod debug;
mod executor;
mod graph;
mod metrics;
mod params;
mod pipeline;
mod request;

pub use executor::PipelineExecutor;
pub use graph::{PipelineGraph, ROOT};
pub use metrics::{InMemoryMetrics, MetricsCollector, MetricsSnapshot, NodeStats, NoopMetrics};
pub use pipeline::{Pipeline, RuntimeConfig};
pub use request::RunRequest;
