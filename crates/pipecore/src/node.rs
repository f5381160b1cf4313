use crate::{events::EventEmitter, ExecutionId, NodeError, Value, ValueMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Reserved argument under which a join node receives its predecessors' values
pub const JOIN_INPUTS: &str = "inputs";

/// Reserved output key for node-supplied debug information
pub const DEBUG_KEY: &str = "_debug";

/// Core trait that every pipeline participant implements
#[async_trait]
pub trait Node: Send + Sync {
    /// Type identifier (e.g., "join.documents", "classifier.keyword_question")
    fn node_type(&self) -> &str;

    /// Number of distinct routes this node may choose between
    fn outgoing_edges(&self) -> usize {
        1
    }

    /// Per-run override keys this node accepts
    fn parameters(&self) -> &[&'static str] {
        &[]
    }

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    /// Name the node was registered under
    pub node_name: String,

    pub execution_id: ExecutionId,

    /// Values delivered by predecessors, or the ordered join list under `inputs`
    pub inputs: ValueMap,

    /// Declared input positions that delivered in this run, ascending.
    /// Entry `i` names the declared input behind `inputs[i]` of a join.
    pub input_slots: Vec<usize>,

    /// Per-run overrides routed to this node, debug switches removed
    pub params: ValueMap,

    /// Debug entries supplied by executed ancestors, keyed by node name
    pub upstream_debug: ValueMap,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Caller-owned cancellation token; nodes decide when to honour it
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(node_name: impl Into<String>, execution_id: ExecutionId, events: EventEmitter) -> Self {
        Self {
            node_name: node_name.into(),
            execution_id,
            inputs: ValueMap::new(),
            input_slots: Vec::new(),
            params: ValueMap::new(),
            upstream_debug: ValueMap::new(),
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_input_slots(mut self, slots: Vec<usize>) -> Self {
        self.input_slots = slots;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    /// Get required parameter or return error
    pub fn require_param(&self, name: &str) -> Result<&Value, NodeError> {
        self.params
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing parameter: {}", name)))
    }

    /// Get parameter with default
    pub fn param_or(&self, name: &str, default: Value) -> Value {
        self.params.get(name).cloned().unwrap_or(default)
    }

    /// The ordered predecessor value maps of a join, if this node has more
    /// than one live input edge in the current run.
    pub fn joined_inputs(&self) -> Option<Vec<&ValueMap>> {
        let items = self.inputs.get(JOIN_INPUTS)?.as_array()?;
        items.iter().map(Value::as_object).collect()
    }

    /// Declared input positions of the joined inputs, in the same order.
    /// Falls back to `0..n` when the context carries no slot information.
    pub fn joined_slots(&self) -> Vec<usize> {
        let count = self.joined_inputs().map_or(0, |inputs| inputs.len());
        if self.input_slots.len() == count {
            self.input_slots.clone()
        } else {
            (0..count).collect()
        }
    }

    /// Fail fast if the caller cancelled the run
    pub fn check_cancelled(&self) -> Result<(), NodeError> {
        if self.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        Ok(())
    }
}

/// Which outgoing edges receive a node's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// `output_k`, 1-based
    Output(usize),
    /// `output_all`
    All,
}

impl Route {
    pub fn matches(&self, label: usize) -> bool {
        match self {
            Route::Output(k) => *k == label,
            Route::All => true,
        }
    }
}

impl Default for Route {
    fn default() -> Self {
        Route::Output(1)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Output(k) => write!(f, "output_{}", k),
            Route::All => write!(f, "output_all"),
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "output_all" {
            return Ok(Route::All);
        }
        let index = s
            .strip_prefix("output_")
            .ok_or_else(|| format!("'{}' is not of the form output_<n>", s))?;
        match index.parse::<usize>() {
            Ok(k) if k >= 1 => Ok(Route::Output(k)),
            _ => Err(format!("'{}' must end in a positive integer", s)),
        }
    }
}

/// Output from node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Named output values
    pub outputs: ValueMap,

    /// Selected outgoing route
    pub route: Route,

    /// Free-form debug information recorded under this node's name
    pub debug: ValueMap,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self {
            outputs: ValueMap::new(),
            route: Route::default(),
            debug: ValueMap::new(),
        }
    }

    /// Start from an existing value map, e.g. to pass inputs through
    pub fn from_values(outputs: ValueMap) -> Self {
        Self {
            outputs,
            ..Self::new()
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn with_debug(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.debug.insert(key.into(), value.into());
        self
    }

    /// Move an `_debug` object found in `outputs` into `debug`
    pub fn normalize(mut self) -> Self {
        if let Some(value) = self.outputs.remove(DEBUG_KEY) {
            match value {
                Value::Object(entries) => self.debug.extend(entries),
                other => {
                    self.debug.insert(DEBUG_KEY.to_string(), other);
                }
            }
        }
        self
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::new()
    }
}
