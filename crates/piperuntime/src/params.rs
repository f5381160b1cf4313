use crate::debug::NodeDebugFlags;
use crate::graph::{PipelineGraph, ROOT};
use pipecore::{Node, RunError, Value, ValueMap};
use std::collections::HashMap;

const DEBUG: &str = "debug";
const DEBUG_LOGS: &str = "debug_logs";

/// Overrides for one invocation
#[derive(Debug, Clone, Default)]
pub(crate) struct RoutedParams {
    pub params: ValueMap,
    pub debug: NodeDebugFlags,
}

/// Distributes the per-node params of a single run
pub(crate) struct ParamRouter {
    params: HashMap<String, ValueMap>,
}

impl ParamRouter {
    /// Every params entry must name a node of the graph. Keys are checked
    /// later, when the node is about to run.
    pub fn new(graph: &PipelineGraph, params: HashMap<String, ValueMap>) -> Result<Self, RunError> {
        let mut targets: Vec<&String> = params.keys().collect();
        targets.sort();
        if let Some(unknown) = targets
            .into_iter()
            .find(|name| name.as_str() == ROOT || !graph.contains(name))
        {
            return Err(RunError::UnknownParamsTarget(unknown.clone()));
        }

        Ok(Self { params })
    }

    pub fn route(&self, node: &str, component: &dyn Node) -> Result<RoutedParams, RunError> {
        let Some(entry) = self.params.get(node) else {
            return Ok(RoutedParams::default());
        };

        let accepted = component.parameters();
        let mut routed = RoutedParams::default();

        let mut keys: Vec<&String> = entry.keys().collect();
        keys.sort();
        for key in keys {
            let value = &entry[key];
            match key.as_str() {
                DEBUG => routed.debug.debug = Some(debug_flag(node, key, value)?),
                DEBUG_LOGS => routed.debug.debug_logs = Some(debug_flag(node, key, value)?),
                other if accepted.iter().any(|name| *name == other) => {
                    routed.params.insert(key.clone(), value.clone());
                }
                _ => {
                    return Err(RunError::InvalidParameter {
                        node: node.to_string(),
                        key: key.clone(),
                    })
                }
            }
        }

        Ok(routed)
    }
}

fn debug_flag(node: &str, key: &str, value: &Value) -> Result<bool, RunError> {
    value.as_bool().ok_or_else(|| RunError::InvalidParameter {
        node: node.to_string(),
        key: key.to_string(),
    })
}
