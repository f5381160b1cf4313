use crate::debug::DebugTrace;
use crate::graph::PipelineGraph;
use petgraph::graph::NodeIndex;
use pipecore::{ExecutionId, Value, ValueMap, JOIN_INPUTS};

/// What one predecessor edge delivered
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub values: ValueMap,
    /// Node-supplied debug entries of the sending branch, keyed by node name
    pub debug: ValueMap,
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Pending,
    Delivered(Delivery),
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeStatus {
    Waiting,
    Queued,
    Done,
    Skipped,
}

/// Outcome of resolving one input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Other slots are still pending
    Waiting,
    /// Every slot resolved and at least one delivered
    Ready,
    /// Every slot resolved as unreachable
    Unreachable,
}

/// Arguments assembled for one invocation
pub(crate) struct AssembledInputs {
    pub inputs: ValueMap,
    /// Declared positions of the slots that delivered
    pub slots: Vec<usize>,
    pub upstream_debug: ValueMap,
}

/// Per-run mutable state: one mailbox per node, completion flags, terminal
/// outputs and the debug trace. Never shared between runs.
pub struct RunContext {
    execution_id: ExecutionId,
    mailboxes: Vec<Vec<Slot>>,
    status: Vec<NodeStatus>,
    terminal_outputs: Vec<Option<ValueMap>>,
    pub(crate) trace: DebugTrace,
}

impl RunContext {
    pub(crate) fn new(graph: &PipelineGraph, execution_id: ExecutionId) -> Self {
        let count = graph.node_count();
        let mailboxes = (0..count)
            .map(|i| vec![Slot::Pending; graph.in_degree(NodeIndex::new(i))])
            .collect();

        Self {
            execution_id,
            mailboxes,
            status: vec![NodeStatus::Waiting; count],
            terminal_outputs: vec![None; count],
            trace: DebugTrace::default(),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub(crate) fn status(&self, idx: NodeIndex) -> NodeStatus {
        self.status[idx.index()]
    }

    pub(crate) fn set_status(&mut self, idx: NodeIndex, status: NodeStatus) {
        self.status[idx.index()] = status;
    }

    /// Fill `slot` of `target` and report whether the target can now be decided
    pub(crate) fn resolve_slot(&mut self, target: NodeIndex, slot: usize, value: Slot) -> Readiness {
        let mailbox = &mut self.mailboxes[target.index()];
        debug_assert!(matches!(mailbox[slot], Slot::Pending));
        mailbox[slot] = value;

        if mailbox.iter().any(|s| matches!(s, Slot::Pending)) {
            Readiness::Waiting
        } else if mailbox.iter().any(|s| matches!(s, Slot::Delivered(_))) {
            Readiness::Ready
        } else {
            Readiness::Unreachable
        }
    }

    /// Build the call arguments of a ready node.
    ///
    /// A single live input is merged directly; several are exposed, in
    /// declaration order, as an array under `inputs`.
    pub(crate) fn take_inputs(&mut self, idx: NodeIndex) -> AssembledInputs {
        let (slots, mut delivered): (Vec<usize>, Vec<Delivery>) =
            std::mem::take(&mut self.mailboxes[idx.index()])
                .into_iter()
                .enumerate()
                .filter_map(|(position, slot)| match slot {
                    Slot::Delivered(delivery) => Some((position, delivery)),
                    _ => None,
                })
                .unzip();

        let mut upstream_debug = ValueMap::new();
        for delivery in &delivered {
            upstream_debug.extend(delivery.debug.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let inputs = if delivered.len() == 1 {
            delivered.remove(0).values
        } else {
            let list = delivered
                .into_iter()
                .map(|delivery| Value::Object(delivery.values))
                .collect();
            let mut inputs = ValueMap::new();
            inputs.insert(JOIN_INPUTS.to_string(), Value::Array(list));
            inputs
        };

        AssembledInputs {
            inputs,
            slots,
            upstream_debug,
        }
    }

    /// Record the output of a node that routed to no successor
    pub(crate) fn record_terminal(&mut self, idx: NodeIndex, outputs: ValueMap) {
        self.terminal_outputs[idx.index()] = Some(outputs);
    }

    /// Merge terminal outputs in declaration order; later nodes win on collisions
    pub(crate) fn into_result(self) -> (ValueMap, DebugTrace) {
        let mut result = ValueMap::new();
        for outputs in self.terminal_outputs.into_iter().flatten() {
            result.extend(outputs);
        }
        (result, self.trace)
    }
}
