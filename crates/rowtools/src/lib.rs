//! Standard tool library
//!
//! Collection of built-in tools for common operations. Node bodies are
//! pluggable; these ship as defaults and as references for writing custom
//! tools.

mod chunks;
mod echo;
mod http;
mod time;
mod transform;

pub use chunks::TextChunksTool;
pub use echo::EchoTool;
pub use http::HttpFetchTool;
pub use time::DelayTool;
pub use transform::{JsonParseTool, JsonStringifyTool};

use rowruntime::ToolRegistry;
use std::sync::Arc;

/// Register all standard tools with a registry
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Arc::new(chunks::TextChunksToolFactory));
    registry.register(Arc::new(echo::EchoToolFactory));
    registry.register(Arc::new(http::HttpFetchToolFactory));
    registry.register(Arc::new(time::DelayToolFactory));
    registry.register(Arc::new(transform::JsonParseToolFactory));
    registry.register(Arc::new(transform::JsonStringifyToolFactory));
}
