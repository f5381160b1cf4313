use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: NodeError,
    },
}

impl PipelineError {
    /// The error raised by a node implementation, if that is what aborted the run
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            PipelineError::Node { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Raised by node implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Topology errors; the graph is left unchanged when one is returned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node '{0}' is already part of the pipeline")]
    DuplicateNode(String),

    #[error("Node '{node}' references unknown predecessor '{predecessor}'")]
    UnknownPredecessor { node: String, predecessor: String },

    #[error("Invalid edge '{edge}' into node '{node}': {reason}")]
    InvalidEdgeLabel {
        node: String,
        edge: String,
        reason: String,
    },

    #[error("Node '{0}' must declare at least one input")]
    MissingInputs(String),

    #[error("Node '{0}' must declare at least one outgoing edge")]
    InvalidOutgoingEdges(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,
}

/// Errors fatal to a single run; the pipeline stays usable
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    /// `reason` carries its own punctuation, e.g. "missing 1 required argument:"
    #[error("run() {reason} '{argument}'")]
    InvalidRunArgument { argument: String, reason: String },

    #[error("Invalid parameter '{key}' for the node '{node}'")]
    InvalidParameter { node: String, key: String },

    #[error("No node named '{0}' found in pipeline for the given params")]
    UnknownParamsTarget(String),

    #[error("Node '{node}' returned route '{route}' outside its declared outgoing edges")]
    InvalidRoute { node: String, route: String },
}
