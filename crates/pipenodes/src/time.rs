use async_trait::async_trait;
use pipecore::{Node, NodeContext, NodeError, NodeOutput};
use tokio::time::{sleep, Duration};

/// Delay execution for `delay_ms` milliseconds, then pass inputs through
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn parameters(&self) -> &[&'static str] {
        &["delay_ms"]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = ctx.params.get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as u64;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
        }

        Ok(NodeOutput::from_values(ctx.inputs))
    }
}
