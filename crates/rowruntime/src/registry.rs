use rowcore::{GraphError, Result, Tool, ToolError, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating tool instances
pub trait ToolFactory: Send + Sync {
    /// Create a new instance of the tool with given configuration
    fn create(&self, config: &HashMap<String, Value>) -> std::result::Result<Box<dyn Tool>, ToolError>;

    /// Get tool type identifier
    fn tool_type(&self) -> &str;

    /// Optional: Get tool metadata (description, input/output schema, etc.)
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }
}

/// Metadata about a tool type
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Registry of available tool providers. Variant implementations live
/// behind the `Tool` trait in this lookup table; there is no inheritance
/// chain.
pub struct ToolRegistry {
    factories: HashMap<String, Arc<dyn ToolFactory>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a tool factory
    pub fn register(&mut self, factory: Arc<dyn ToolFactory>) {
        let tool_type = factory.tool_type().to_string();
        tracing::info!("Registering tool type: {}", tool_type);
        self.factories.insert(tool_type, factory);
    }

    pub fn contains(&self, tool_type: &str) -> bool {
        self.factories.contains_key(tool_type)
    }

    /// Create a tool instance from a tool type and config
    pub fn create_tool(
        &self,
        tool_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Tool>> {
        let factory = self
            .factories
            .get(tool_type)
            .ok_or_else(|| GraphError::UnknownToolType(tool_type.to_string()))?;

        Ok(factory.create(config)?)
    }

    /// Get all registered tool types
    pub fn list_tool_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Get metadata for a tool type
    pub fn get_metadata(&self, tool_type: &str) -> Option<ToolMetadata> {
        self.factories.get(tool_type).map(|f| f.metadata())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
