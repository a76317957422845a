use crate::{GraphError, UserError, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Binding of one node input to its producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "from", content = "ref")]
pub enum InputBinding {
    /// Inline literal value.
    Literal(Value),
    /// Flow-level input by name.
    FlowInput(String),
    /// Output of an upstream node by node name.
    NodeOutput(String),
}

/// Declared flow-level input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInput {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl FlowInput {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// Declared flow-level output and the binding that feeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOutput {
    pub name: String,
    pub binding: InputBinding,
}

impl FlowOutput {
    pub fn from_node(name: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: InputBinding::NodeOutput(node.into()),
        }
    }
}

/// Named alternative configuration for one node. Entries named here replace
/// the node's own; everything unnamed is untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantDef {
    pub inputs: HashMap<String, InputBinding>,
    pub config: HashMap<String, Value>,
    pub source: Option<String>,
}

/// One unit of computation with declared input bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    /// Tool provider reference, e.g. "transform.json_parse".
    pub tool: String,
    pub inputs: HashMap<String, InputBinding>,
    pub config: HashMap<String, Value>,
    /// Relative path of a supporting file under the graph's working
    /// directory; inlined into config at variant materialization.
    pub source: Option<String>,
    pub variants: HashMap<String, VariantDef>,
    pub aggregation: bool,
    pub tolerate_errors: bool,
}

impl NodeDef {
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            inputs: HashMap::new(),
            config: HashMap::new(),
            source: None,
            variants: HashMap::new(),
            aggregation: false,
            tolerate_errors: false,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    pub fn with_literal(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs
            .insert(name.into(), InputBinding::Literal(value.into()));
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn with_variant(mut self, id: impl Into<String>, variant: VariantDef) -> Self {
        self.variants.insert(id.into(), variant);
        self
    }

    pub fn aggregation(mut self) -> Self {
        self.aggregation = true;
        self
    }

    pub fn tolerate_errors(mut self) -> Self {
        self.tolerate_errors = true;
        self
    }
}

/// Immutable directed acyclic graph of nodes and their input bindings.
///
/// Nodes live in an arena in declaration order; dependencies are derived
/// from input bindings and referenced by arena index. Built once per run and
/// read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub name: String,
    pub inputs: Vec<FlowInput>,
    pub outputs: Vec<FlowOutput>,
    pub nodes: Vec<NodeDef>,
    /// Directory holding supporting files referenced by node sources.
    pub working_dir: Option<PathBuf>,
}

impl FlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_input(mut self, input: FlowInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: FlowOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn find_node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Arena indices of the nodes this node's bindings reference.
    pub fn dependencies(&self, index: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self.nodes[index]
            .inputs
            .values()
            .filter_map(|binding| match binding {
                InputBinding::NodeOutput(name) => self.node_index(name),
                _ => None,
            })
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Whether any node in the subset consumes this node's output.
    pub fn has_dependents_within(&self, index: usize, subset: &[usize]) -> bool {
        let name = &self.nodes[index].name;
        subset.iter().any(|&i| {
            i != index
                && self.nodes[i]
                    .inputs
                    .values()
                    .any(|b| matches!(b, InputBinding::NodeOutput(n) if n == name))
        })
    }

    pub fn has_sources(&self) -> bool {
        self.nodes.iter().any(|n| n.source.is_some())
    }

    /// Structural validation: unique node names and bindings that reference
    /// only declared flow inputs or known nodes. Acyclicity is checked by
    /// the scheduler when it builds its dependency graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
        }
        let input_names: HashSet<&str> = self.inputs.iter().map(|i| i.name.as_str()).collect();
        for node in &self.nodes {
            for binding in node.inputs.values() {
                match binding {
                    InputBinding::FlowInput(name) if !input_names.contains(name.as_str()) => {
                        return Err(GraphError::UnknownBindingTarget {
                            node: node.name.clone(),
                            target: name.clone(),
                        });
                    }
                    InputBinding::NodeOutput(name) if self.node_index(name).is_none() => {
                        return Err(GraphError::UnknownBindingTarget {
                            node: node.name.clone(),
                            target: name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
        for output in &self.outputs {
            if let InputBinding::NodeOutput(name) = &output.binding {
                if self.node_index(name).is_none() {
                    return Err(GraphError::UnknownBindingTarget {
                        node: format!("output '{}'", output.name),
                        target: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check one row against the declared input schema, applying defaults.
    pub fn validate_row_inputs(
        &self,
        row: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, UserError> {
        let mut missing = Vec::new();
        let mut resolved = HashMap::new();
        for input in &self.inputs {
            match row.get(&input.name) {
                Some(value) => {
                    if !input.kind.accepts(value) {
                        return Err(UserError::InvalidInputType {
                            field: input.name.clone(),
                            expected: input.kind.name().to_string(),
                            actual: value.kind_name().to_string(),
                        });
                    }
                    resolved.insert(input.name.clone(), value.clone());
                }
                None if input.required => missing.push(input.name.clone()),
                None => {
                    if let Some(default) = &input.default {
                        resolved.insert(input.name.clone(), default.clone());
                    }
                }
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(UserError::MissingInputs(missing));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_graph() -> FlowGraph {
        FlowGraph::new("test")
            .with_input(FlowInput::required("text", ValueKind::String))
            .with_node(
                NodeDef::new("first", "debug.echo")
                    .with_input("message", InputBinding::FlowInput("text".into())),
            )
            .with_node(
                NodeDef::new("second", "debug.echo")
                    .with_input("message", InputBinding::NodeOutput("first".into())),
            )
            .with_output(FlowOutput::from_node("result", "second"))
    }

    #[test]
    fn dependencies_follow_bindings() {
        let graph = two_node_graph();
        assert!(graph.dependencies(0).is_empty());
        assert_eq!(graph.dependencies(1), vec![0]);
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let graph = FlowGraph::new("dup")
            .with_node(NodeDef::new("a", "debug.echo"))
            .with_node(NodeDef::new("a", "debug.echo"));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::DuplicateNode(name)) if name == "a"
        ));
    }

    #[test]
    fn validate_rejects_unknown_binding_target() {
        let graph = FlowGraph::new("bad").with_node(
            NodeDef::new("a", "debug.echo")
                .with_input("message", InputBinding::NodeOutput("ghost".into())),
        );
        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnknownBindingTarget { .. })
        ));
    }

    #[test]
    fn row_validation_reports_missing_and_mismatched() {
        let graph = two_node_graph();
        let err = graph.validate_row_inputs(&HashMap::new()).unwrap_err();
        assert!(matches!(err, UserError::MissingInputs(names) if names == vec!["text"]));

        let mut row = HashMap::new();
        row.insert("text".to_string(), Value::Number(3.0));
        assert!(matches!(
            graph.validate_row_inputs(&row),
            Err(UserError::InvalidInputType { .. })
        ));
    }

    #[test]
    fn row_validation_applies_defaults() {
        let graph = FlowGraph::new("defaults").with_input(FlowInput::optional(
            "mode",
            ValueKind::String,
            Value::from("fast"),
        ));
        let resolved = graph.validate_row_inputs(&HashMap::new()).unwrap();
        assert_eq!(resolved.get("mode"), Some(&Value::from("fast")));
    }
}
