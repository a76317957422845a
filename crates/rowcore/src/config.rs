use crate::Value;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// One node-scoped parameter override: either an inline literal value or a
/// reference to a named connection resolved through the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConnectionInput {
    Reference { connection: String },
    Literal(Value),
}

/// Per-invocation configuration snapshot. Constructed once and treated as
/// read-only for its lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// node name -> parameter name -> literal or connection reference.
    pub connections: HashMap<String, HashMap<String, ConnectionInput>>,
    /// Variant selector, e.g. "${summarize.variant_1}".
    pub variant: Option<String>,
    /// Applied to the tool execution context, not to resolution.
    pub environment_variables: HashMap<String, String>,
    /// Dotted-path patch over node configuration, e.g.
    /// "nodes.summarize.inputs.style".
    pub overrides: HashMap<String, Value>,
    /// Request incremental terminal output where the row's tool supports it.
    pub streaming: bool,
}

impl ExecutionConfig {
    /// Deterministic identity key over (variant, connections, overrides).
    ///
    /// Environment variables and the streaming flag are excluded: they are
    /// applied at execution time and never affect connection resolution.
    /// serde_json maps are ordered, so the rendered form is canonical.
    pub fn identity_key(&self) -> String {
        json!({
            "variant": self.variant,
            "connections": self.connections,
            "overrides": self.overrides,
        })
        .to_string()
    }
}
