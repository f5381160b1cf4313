use crate::context::{Delivery, NodeStatus, Readiness, RunContext, Slot};
use crate::debug::{CaptureDecision, DebugOverlay};
use crate::graph::PipelineGraph;
use crate::metrics::MetricsCollector;
use crate::params::ParamRouter;
use crate::request::RunRequest;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::graph::NodeIndex;
use pipecore::{
    EventBus, ExecutionEvent, ExecutionId, NodeContext, NodeError, NodeOutput, PipelineError,
    Route, RunError, Value, ValueMap, DEBUG_KEY,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes a pipeline graph for one request at a time
pub struct PipelineExecutor {
    max_parallel: usize,
}

impl PipelineExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Run `graph` for `request` and return the merged terminal outputs,
    /// plus `_debug` when anything was captured.
    pub async fn execute(
        &self,
        graph: &PipelineGraph,
        request: RunRequest,
        event_bus: &EventBus,
        metrics: &dyn MetricsCollector,
    ) -> Result<ValueMap, PipelineError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            query: request.query.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!("Starting pipeline run: {}", execution_id);

        let result = self
            .execute_graph(graph, request, event_bus, metrics, execution_id)
            .await;

        let elapsed = start_time.elapsed();
        let success = result.is_ok();
        metrics.run_finished(elapsed, success);

        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            success,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(_) => tracing::info!("Pipeline run {} completed in {}ms", execution_id, elapsed.as_millis()),
            Err(e) => tracing::error!("Pipeline run {} failed: {}", execution_id, e),
        }

        result
    }

    async fn execute_graph(
        &self,
        graph: &PipelineGraph,
        request: RunRequest,
        event_bus: &EventBus,
        metrics: &dyn MetricsCollector,
        execution_id: ExecutionId,
    ) -> Result<ValueMap, PipelineError> {
        graph.validate()?;

        let initial_values = request.initial_values();
        let overlay = DebugOverlay::new(request.debug, request.debug_logs);
        let router = ParamRouter::new(graph, request.params)?;
        let cancellation = request.cancellation;

        let mut scheduler = Scheduler {
            graph,
            event_bus,
            metrics,
            ctx: RunContext::new(graph, execution_id),
            ready: VecDeque::new(),
        };

        // The root is never invoked: its output is the request itself
        let root = graph.root();
        scheduler.ctx.set_status(root, NodeStatus::Done);
        scheduler.finish_node(root, Route::Output(1), initial_values, ValueMap::new());

        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < self.max_parallel {
                let Some(idx) = scheduler.ready.pop_front() else {
                    break;
                };
                debug_assert_eq!(scheduler.ctx.status(idx), NodeStatus::Queued);

                let entry = graph.entry(idx);
                let routed = router.route(&entry.name, entry.component.as_ref())?;
                let decision = overlay.decide(routed.debug);
                let assembled = scheduler.ctx.take_inputs(idx);

                let snapshot = decision.capture.then(|| {
                    let mut input = assembled.inputs.clone();
                    input.extend(routed.params.iter().map(|(k, v)| (k.clone(), v.clone())));
                    input
                });

                let node_ctx = NodeContext {
                    node_name: entry.name.clone(),
                    execution_id,
                    inputs: assembled.inputs,
                    input_slots: assembled.slots,
                    params: routed.params,
                    upstream_debug: assembled.upstream_debug.clone(),
                    events: event_bus.create_emitter(execution_id, &entry.name),
                    cancellation: cancellation.clone(),
                };

                event_bus.emit(ExecutionEvent::NodeStarted {
                    execution_id,
                    node: entry.name.clone(),
                    node_type: entry.component.node_type().to_string(),
                    timestamp: Utc::now(),
                });

                let component = Arc::clone(&entry.component);
                let upstream_debug = assembled.upstream_debug;
                running.push(async move {
                    let start = Instant::now();
                    let result = component.execute(node_ctx).await;
                    Invocation {
                        idx,
                        result,
                        elapsed: start.elapsed(),
                        decision,
                        snapshot,
                        upstream_debug,
                    }
                });
            }

            // Nothing in flight and nothing ready: every node is done or skipped
            let Some(invocation) = running.next().await else {
                break;
            };
            scheduler.complete(invocation)?;
        }

        let (mut result, trace) = scheduler.ctx.into_result();
        if !overlay.suppressed() && !trace.is_empty() {
            result.insert(DEBUG_KEY.to_string(), trace.into_value());
        }

        Ok(result)
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A finished node call waiting to be recorded
struct Invocation {
    idx: NodeIndex,
    result: Result<NodeOutput, NodeError>,
    elapsed: Duration,
    decision: CaptureDecision,
    snapshot: Option<ValueMap>,
    upstream_debug: ValueMap,
}

/// Mutable state of one run
struct Scheduler<'a> {
    graph: &'a PipelineGraph,
    event_bus: &'a EventBus,
    metrics: &'a dyn MetricsCollector,
    ctx: RunContext,
    ready: VecDeque<NodeIndex>,
}

impl Scheduler<'_> {
    fn execution_id(&self) -> ExecutionId {
        self.ctx.execution_id()
    }

    fn complete(&mut self, invocation: Invocation) -> Result<(), PipelineError> {
        let Invocation {
            idx,
            result,
            elapsed,
            decision,
            snapshot,
            upstream_debug,
        } = invocation;
        let graph = self.graph;
        let entry = graph.entry(idx);

        let output = match result {
            Ok(output) => output.normalize(),
            Err(e) => {
                tracing::error!("Node {} failed: {}", entry.name, e);
                self.metrics.node_finished(&entry.name, elapsed, false);
                self.event_bus.emit(ExecutionEvent::NodeFailed {
                    execution_id: self.execution_id(),
                    node: entry.name.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(PipelineError::Node {
                    node: entry.name.clone(),
                    source: e,
                });
            }
        };
        self.metrics.node_finished(&entry.name, elapsed, true);

        if let Route::Output(k) = output.route {
            if k == 0 || k > entry.outgoing_edges {
                return Err(RunError::InvalidRoute {
                    node: entry.name.clone(),
                    route: output.route.to_string(),
                }
                .into());
            }
        }

        tracing::info!("Node {} completed in {}ms", entry.name, elapsed.as_millis());
        self.event_bus.emit(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id(),
            node: entry.name.clone(),
            route: output.route,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });

        if let Some(input) = snapshot {
            self.ctx.trace.capture(&entry.name, decision, input, &output.outputs);
        }

        let NodeOutput {
            outputs,
            route,
            debug,
        } = output;

        let mut forwarded_debug = upstream_debug;
        if !debug.is_empty() {
            forwarded_debug.insert(entry.name.clone(), Value::Object(debug.clone()));
        }
        self.ctx.trace.extend_extra(&entry.name, debug);

        self.ctx.set_status(idx, NodeStatus::Done);
        self.finish_node(idx, route, outputs, forwarded_debug);
        Ok(())
    }

    /// Deliver a copy of `outputs` along every edge selected by `route` and
    /// mark the others unreachable. A node that delivers nowhere is terminal.
    fn finish_node(&mut self, idx: NodeIndex, route: Route, outputs: ValueMap, debug: ValueMap) {
        let graph = self.graph;
        let mut delivered_any = false;

        for (_, target, label) in graph.successors(idx) {
            let slot = if route.matches(label.output) {
                delivered_any = true;
                Slot::Delivered(Delivery {
                    values: outputs.clone(),
                    debug: debug.clone(),
                })
            } else {
                tracing::debug!(
                    "Edge {}.output_{} -> {} not taken ({})",
                    graph.entry(idx).name,
                    label.output,
                    graph.entry(target).name,
                    route
                );
                Slot::Unreachable
            };
            self.resolve(target, label.slot, slot);
        }

        if !delivered_any {
            self.ctx.record_terminal(idx, outputs);
        }
    }

    /// Fill one input slot, queueing or skipping the target once it is decided
    fn resolve(&mut self, target: NodeIndex, slot: usize, value: Slot) {
        let mut unreachable = match self.ctx.resolve_slot(target, slot, value) {
            Readiness::Waiting => return,
            Readiness::Ready => {
                self.enqueue(target);
                return;
            }
            Readiness::Unreachable => vec![target],
        };

        // Skips cascade through every successor left without a live input
        let graph = self.graph;
        while let Some(idx) = unreachable.pop() {
            self.ctx.set_status(idx, NodeStatus::Skipped);
            let name = &graph.entry(idx).name;
            tracing::debug!("Node {} is unreachable in this run", name);
            self.event_bus.emit(ExecutionEvent::NodeSkipped {
                execution_id: self.execution_id(),
                node: name.clone(),
                timestamp: Utc::now(),
            });

            for (_, successor, label) in graph.successors(idx) {
                match self.ctx.resolve_slot(successor, label.slot, Slot::Unreachable) {
                    Readiness::Waiting => {}
                    Readiness::Ready => self.enqueue(successor),
                    Readiness::Unreachable => unreachable.push(successor),
                }
            }
        }
    }

    fn enqueue(&mut self, idx: NodeIndex) {
        self.ctx.set_status(idx, NodeStatus::Queued);
        self.ready.push_back(idx);
    }
}
