use async_trait::async_trait;
use rowcore::{Output, Tool, ToolContext, ToolError, Value};
use rowruntime::{ToolFactory, ToolMetadata};
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration, then pass inputs through
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn tool_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(1000.0) as u64; // Default to 1 second if not specified

        tracing::debug!(node = %ctx.node, "Delaying for {}ms", delay_ms);

        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(ToolError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }

        // Pass through any inputs
        Ok(Output::Value(Value::Object(ctx.inputs.clone())))
    }
}

pub struct DelayToolFactory;

impl ToolFactory for DelayToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(DelayTool))
    }

    fn tool_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
