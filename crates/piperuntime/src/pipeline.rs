use crate::graph::PipelineGraph;
use crate::metrics::{MetricsCollector, NoopMetrics};
use crate::request::RunRequest;
use crate::PipelineExecutor;
use pipecore::{EventBus, ExecutionEvent, GraphError, Node, PipelineError, ValueMap};
use std::sync::Arc;

/// A graph of nodes that can be run any number of times, concurrently
/// if needed. Building needs `&mut self`; running only needs `&self`.
pub struct Pipeline {
    graph: PipelineGraph,
    executor: PipelineExecutor,
    event_bus: Arc<EventBus>,
    metrics: Arc<dyn MetricsCollector>,
}

impl Pipeline {
    /// Create a new pipeline with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new pipeline with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            graph: PipelineGraph::new(),
            executor: PipelineExecutor::new(config.max_parallel_nodes),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replace the metrics collector
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Add `component` under `name`; see [`PipelineGraph::add_node`]
    pub fn add_node<I, S>(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn Node>,
        inputs: I,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.graph.add_node(name, component, inputs)
    }

    /// Check the topology without running it
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Execute one request
    pub async fn run(&self, request: RunRequest) -> Result<ValueMap, PipelineError> {
        self.executor
            .execute(&self.graph, request, &self.event_bus, self.metrics.as_ref())
            .await
    }

    /// Execute with loosely typed keyword arguments (`query`, `documents`,
    /// `meta`, `params`, `debug`, `debug_logs`)
    pub async fn run_with_args(&self, args: ValueMap) -> Result<ValueMap, PipelineError> {
        let request = RunRequest::from_args(args)?;
        self.run(request).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on independent nodes in flight within one run
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 1,
            event_buffer_size: 1000,
        }
    }
}
