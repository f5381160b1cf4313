//! Per-run capture of node inputs and outputs.
//!
//! An explicit run-level `debug` / `debug_logs` flag overrides whatever the
//! individual nodes asked for through their params; when the run-level flag
//! is unset each node's own switch applies.

use pipecore::{Value, ValueMap};
use std::collections::BTreeMap;

/// A node's own switches, taken from its per-run params
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NodeDebugFlags {
    pub debug: Option<bool>,
    pub debug_logs: Option<bool>,
}

/// What to do for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CaptureDecision {
    pub capture: bool,
    pub human_readable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DebugOverlay {
    debug: Option<bool>,
    debug_logs: Option<bool>,
}

impl DebugOverlay {
    pub fn new(debug: Option<bool>, debug_logs: Option<bool>) -> Self {
        Self { debug, debug_logs }
    }

    pub fn decide(&self, node: NodeDebugFlags) -> CaptureDecision {
        let capture = self.debug.or(node.debug).unwrap_or(false);
        let human_readable = capture && self.debug_logs.or(node.debug_logs).unwrap_or(false);
        CaptureDecision {
            capture,
            human_readable,
        }
    }

    /// `debug=false` at run level drops `_debug` from the result entirely
    pub fn suppressed(&self) -> bool {
        self.debug == Some(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DebugRecord {
    pub input: Option<Value>,
    pub output: Option<Value>,
    /// Entries supplied by the node itself
    pub extra: ValueMap,
}

impl DebugRecord {
    fn into_value(self) -> Value {
        let mut map = self.extra;
        if let Some(input) = self.input {
            map.insert("input".to_string(), input);
        }
        if let Some(output) = self.output {
            map.insert("output".to_string(), output);
        }
        Value::Object(map)
    }
}

/// Debug records of one run, keyed by node name
#[derive(Debug, Clone, Default)]
pub(crate) struct DebugTrace {
    records: BTreeMap<String, DebugRecord>,
}

impl DebugTrace {
    pub fn capture(&mut self, node: &str, decision: CaptureDecision, input: ValueMap, output: &ValueMap) {
        let (input, output) = if decision.human_readable {
            let input = stringify(&input);
            let output = stringify(output);
            tracing::info!(node = node, input = %input, output = %output, "Captured node debug info");
            (input, output)
        } else {
            (Value::Object(input), Value::Object(output.clone()))
        };

        let record = self.records.entry(node.to_string()).or_default();
        record.input = Some(input);
        record.output = Some(output);
    }

    pub fn extend_extra(&mut self, node: &str, extra: ValueMap) {
        if extra.is_empty() {
            return;
        }
        self.records
            .entry(node.to_string())
            .or_default()
            .extra
            .extend(extra);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(
            self.records
                .into_iter()
                .map(|(node, record)| (node, record.into_value()))
                .collect(),
        )
    }
}

fn stringify(map: &ValueMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.to_string())))
            .collect(),
    )
}
