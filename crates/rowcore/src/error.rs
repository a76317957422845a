use thiserror::Error;

/// Top-level engine error. Variants distinguish the taxonomy callers branch
/// on: user mistakes, tool-body failures, graph definition problems, and
/// unexpected faults inside the engine itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("user error: {0}")]
    User(#[from] UserError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("system error: {0}")]
    System(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller mistakes. Surfaced immediately and never retried.
#[derive(Error, Debug, Clone)]
pub enum UserError {
    #[error("required input(s) {0:?} are missing")]
    MissingInputs(Vec<String>),

    #[error("invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("variant {variant} not found for node {node}")]
    VariantNotFound { node: String, variant: String },

    #[error("invalid variant selector: {0}")]
    InvalidVariantSelector(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("connection '{0}' is not found")]
    ConnectionNotFound(String),

    #[error("missing substitute output for upstream node '{0}'")]
    MissingSubstituteOutput(String),

    #[error("invalid override path: {0}")]
    InvalidOverridePath(String),
}

/// A node body raised during execution. Recorded per node; propagates to the
/// caller only in strict mode.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("cancelled")]
    Cancelled,
}

/// Problems with the graph definition itself.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("cyclic dependency detected")]
    CyclicDependency,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("node '{node}' references unknown input '{target}'")]
    UnknownBindingTarget { node: String, target: String },

    #[error("unknown tool type: {0}")]
    UnknownToolType(String),

    #[error("node '{0}' has a source file but the graph has no working directory")]
    SourceWithoutWorkingDir(String),
}
