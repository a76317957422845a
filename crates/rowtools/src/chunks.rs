use async_trait::async_trait;
use rowcore::{Output, OutputStream, Tool, ToolContext, ToolError, Value};
use rowruntime::{ToolFactory, ToolMetadata};
use std::collections::HashMap;

/// Splits input text into fixed-size chunks.
///
/// When the context requests streaming, the chunks are returned as a lazy
/// producer so terminal output can be exposed incrementally; otherwise the
/// text is returned buffered as a single value. Concatenating the streamed
/// chunks reproduces the original text.
pub struct TextChunksTool;

#[async_trait]
impl Tool for TextChunksTool {
    fn tool_type(&self) -> &str {
        "text.chunks"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let text = ctx
            .require_input("text")?
            .as_str()
            .ok_or_else(|| ToolError::InvalidInputType {
                field: "text".to_string(),
                expected: "string".to_string(),
                actual: ctx.inputs["text"].kind_name().to_string(),
            })?
            .to_string();
        let chunk_size = ctx
            .get_config_or("chunk_size", Value::Number(8.0))
            .as_f64()
            .unwrap_or(8.0)
            .max(1.0) as usize;

        if !ctx.streaming {
            return Ok(Output::Value(Value::String(text)));
        }

        let chunks: Vec<Value> = text
            .chars()
            .collect::<Vec<char>>()
            .chunks(chunk_size)
            .map(|chunk| Value::String(chunk.iter().collect()))
            .collect();
        tracing::debug!(node = %ctx.node, chunks = chunks.len(), "streaming text chunks");
        Ok(Output::Stream(OutputStream::from_values(chunks)))
    }
}

pub struct TextChunksToolFactory;

impl ToolFactory for TextChunksToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(TextChunksTool))
    }

    fn tool_type(&self) -> &str {
        "text.chunks"
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            description: "Split text into chunks, streamed when requested".to_string(),
            category: "text".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}
