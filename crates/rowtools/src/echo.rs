use async_trait::async_trait;
use rowcore::{Output, Tool, ToolContext, ToolError, Value};
use rowruntime::{ToolFactory, ToolMetadata};
use std::collections::HashMap;

/// Simple debug tool that logs and echoes its input
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn tool_type(&self) -> &str {
        "debug.echo"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let message = ctx
            .inputs
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");

        tracing::info!(node = %ctx.node, "ECHO: {}", message);

        // Also log all inputs for visibility
        for (key, value) in &ctx.inputs {
            tracing::debug!("  {}: {:?}", key, value);
        }

        Ok(Output::Value(Value::String(message.to_string())))
    }
}

pub struct EchoToolFactory;

impl ToolFactory for EchoToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(EchoTool))
    }

    fn tool_type(&self) -> &str {
        "debug.echo"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Logs and echoes input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
