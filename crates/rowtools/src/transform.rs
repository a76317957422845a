use async_trait::async_trait;
use rowcore::{Output, Tool, ToolContext, ToolError, Value};
use rowruntime::{ToolFactory, ToolMetadata};
use std::collections::HashMap;

/// Parse JSON string to Value
pub struct JsonParseTool;

#[async_trait]
impl Tool for JsonParseTool {
    fn tool_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let input = ctx
            .require_input("json")?
            .as_str()
            .ok_or_else(|| ToolError::InvalidInputType {
                field: "json".to_string(),
                expected: "string".to_string(),
                actual: ctx.inputs["json"].kind_name().to_string(),
            })?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| ToolError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(Output::Value(Value::Json(parsed)))
    }
}

pub struct JsonParseToolFactory;

impl ToolFactory for JsonParseToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(JsonParseTool))
    }

    fn tool_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyTool;

#[async_trait]
impl Tool for JsonStringifyTool {
    fn tool_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let value = ctx.require_input("value")?;

        let json_str = serde_json::to_string_pretty(value)
            .map_err(|e| ToolError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(Output::Value(Value::String(json_str)))
    }
}

pub struct JsonStringifyToolFactory;

impl ToolFactory for JsonStringifyToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(JsonStringifyTool))
    }

    fn tool_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
