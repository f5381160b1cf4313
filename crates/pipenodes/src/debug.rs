use async_trait::async_trait;
use pipecore::{Node, NodeContext, NodeError, NodeOutput};

/// Reports its inputs as node events and passes them through
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn parameters(&self) -> &[&'static str] {
        &["message"]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let message = ctx.params.get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");

        ctx.events.info(format!("DEBUG: {}", message));
        tracing::debug!("{}: {}", ctx.node_name, message);

        // Sorted for a stable event order
        let mut keys: Vec<&String> = ctx.inputs.keys().collect();
        keys.sort();
        for key in keys {
            ctx.events.info(format!("  {}: {}", key, ctx.inputs[key]));
        }

        Ok(NodeOutput::from_values(ctx.inputs))
    }
}
