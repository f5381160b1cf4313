use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use pipecore::{GraphError, Node, NodeContext, NodeError, NodeOutput, Route};
use std::collections::HashMap;
use std::sync::Arc;

/// Name of the synthetic entry node every pipeline starts from
pub const ROOT: &str = "Query";

/// Synthetic entry point. Its output is seeded from the run request and it
/// is never invoked by the scheduler.
struct RootNode;

#[async_trait]
impl Node for RootNode {
    fn node_type(&self) -> &str {
        "root.query"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::from_values(ctx.inputs))
    }
}

/// A registered node and the inputs it was declared with
pub(crate) struct NodeEntry {
    pub name: String,
    pub component: Arc<dyn Node>,
    pub outgoing_edges: usize,
    pub declared_inputs: Vec<String>,
}

/// Edge weight: which output of the source feeds which input slot of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EdgeLabel {
    /// 1-based `output_k` of the source
    pub output: usize,
    /// Position among the target's declared inputs
    pub slot: usize,
}

/// Node/edge topology of a pipeline.
///
/// Nodes can only reference predecessors that are already registered, so the
/// graph is acyclic by construction; [`PipelineGraph::validate`] checks it anyway.
pub struct PipelineGraph {
    graph: DiGraph<NodeEntry, EdgeLabel>,
    node_to_index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl PipelineGraph {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(NodeEntry {
            name: ROOT.to_string(),
            component: Arc::new(RootNode),
            outgoing_edges: 1,
            declared_inputs: Vec::new(),
        });
        let mut node_to_index = HashMap::new();
        node_to_index.insert(ROOT.to_string(), root);

        Self {
            graph,
            node_to_index,
            root,
        }
    }

    /// Register `component` under `name`, fed by `inputs`.
    ///
    /// Each input is `"Query"`, a bare predecessor name, or
    /// `"<predecessor>.output_<k>"`. A bare name is only allowed when the
    /// predecessor has a single outgoing edge.
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
        let name = name.into();
        if self.node_to_index.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }

        let outgoing_edges = component.outgoing_edges();
        if outgoing_edges == 0 {
            return Err(GraphError::InvalidOutgoingEdges(name));
        }

        let declared_inputs: Vec<String> = inputs
            .into_iter()
            .map(|input| input.as_ref().to_string())
            .collect();
        if declared_inputs.is_empty() {
            return Err(GraphError::MissingInputs(name));
        }

        // Resolve everything before touching the graph
        let mut edges = Vec::with_capacity(declared_inputs.len());
        for (slot, input) in declared_inputs.iter().enumerate() {
            let (source, output) = self.resolve_input(&name, input)?;
            edges.push((source, EdgeLabel { output, slot }));
        }

        let idx = self.graph.add_node(NodeEntry {
            name: name.clone(),
            component,
            outgoing_edges,
            declared_inputs,
        });
        for (source, label) in edges {
            self.graph.add_edge(source, idx, label);
        }
        self.node_to_index.insert(name.clone(), idx);

        tracing::debug!("Added node '{}' ({} outgoing edges)", name, outgoing_edges);
        Ok(())
    }

    fn resolve_input(&self, node: &str, input: &str) -> Result<(NodeIndex, usize), GraphError> {
        let (predecessor, label) = match input.split_once('.') {
            Some((predecessor, label)) => (predecessor, Some(label)),
            None => (input, None),
        };

        let source = *self.node_to_index.get(predecessor).ok_or_else(|| {
            GraphError::UnknownPredecessor {
                node: node.to_string(),
                predecessor: predecessor.to_string(),
            }
        })?;
        let available = self.graph[source].outgoing_edges;

        let invalid = |reason: String| GraphError::InvalidEdgeLabel {
            node: node.to_string(),
            edge: input.to_string(),
            reason,
        };

        let output = match label {
            None if available == 1 => 1,
            None => {
                return Err(invalid(format!(
                    "'{}' has {} outgoing edges, name one explicitly as {}.output_<n>",
                    predecessor, available, predecessor
                )))
            }
            Some(label) => match label.parse::<Route>() {
                Ok(Route::Output(k)) if k <= available => k,
                Ok(Route::Output(k)) => {
                    return Err(invalid(format!(
                        "output_{} exceeds the {} outgoing edge(s) of '{}'",
                        k, available, predecessor
                    )))
                }
                Ok(Route::All) => {
                    return Err(invalid("output_all is a routing choice, not an edge".to_string()))
                }
                Err(reason) => return Err(invalid(reason)),
            },
        };

        Ok((source, output))
    }

    /// Assert the topology is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|_| GraphError::CyclicDependency)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_to_index.contains_key(name)
    }

    /// Registered node names in declaration order, excluding the root
    pub fn node_names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|idx| *idx != self.root)
            .map(|idx| self.graph[idx].name.as_str())
            .collect()
    }

    /// Number of registered nodes, excluding the root
    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared inputs of `name`, as given to `add_node`
    pub fn inputs_of(&self, name: &str) -> Option<&[String]> {
        self.node_to_index
            .get(name)
            .map(|idx| self.graph[*idx].declared_inputs.as_slice())
    }

    pub(crate) fn root(&self) -> NodeIndex {
        self.root
    }

    pub(crate) fn entry(&self, idx: NodeIndex) -> &NodeEntry {
        &self.graph[idx]
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.node_to_index.get(name).copied()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    /// Outgoing edges of `idx` as (edge, target, label), ordered by target
    /// declaration order so traversal is deterministic.
    pub(crate) fn successors(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex, EdgeLabel)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target(), *edge.weight()))
            .collect();
        edges.sort_by_key(|(_, target, label)| (target.index(), label.slot));
        edges
    }
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}
