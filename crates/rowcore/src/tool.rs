use crate::{ConnectionValue, Output, ToolError, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Capability interface all pluggable tool providers implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique type identifier (e.g. "http.fetch", "transform.json_parse").
    fn tool_type(&self) -> &str;

    /// Execute the tool body with the given context.
    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError>;

    /// Optional: validate configuration when the graph is materialized.
    fn validate_config(&self, _config: &HashMap<String, Value>) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Execution context passed to each tool body.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Name of the node being executed.
    pub node: String,
    /// Resolved input values.
    pub inputs: HashMap<String, Value>,
    /// Static configuration after variant materialization.
    pub config: HashMap<String, Value>,
    /// Connection parameters resolved for this node.
    pub connections: HashMap<String, ConnectionValue>,
    /// Environment variable mapping from the execution config.
    pub environment: HashMap<String, String>,
    /// Whether incremental terminal output was requested for this row.
    pub streaming: bool,
    /// Row index within the run, if any.
    pub index: Option<usize>,
    /// Cancellation signal for this row. Bodies doing long work should
    /// observe it cooperatively.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            inputs: HashMap::new(),
            config: HashMap::new(),
            connections: HashMap::new(),
            environment: HashMap::new(),
            streaming: false,
            index: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, ToolError> {
        self.inputs
            .get(name)
            .ok_or_else(|| ToolError::MissingInput(name.to_string()))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, ToolError> {
        self.config
            .get(name)
            .ok_or_else(|| ToolError::Configuration(format!("Missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }
}
