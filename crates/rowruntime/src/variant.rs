use rowcore::{
    ExecutionConfig, FlowGraph, GraphError, InputBinding, Result, UserError, Value,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Materializes a concrete graph from a base graph plus the config's
/// variant selector and override patch. Only the target node's
/// configuration changes; all other nodes and edges are structurally
/// untouched.
pub struct VariantResolver;

impl VariantResolver {
    pub fn resolve(graph: &FlowGraph, config: &ExecutionConfig) -> Result<FlowGraph> {
        let mut materialized = graph.clone();
        if let Some(selector) = config.variant.as_deref() {
            let (node, variant) = parse_selector(selector)?;
            apply_variant(&mut materialized, &node, &variant)?;
            tracing::info!(node = %node, variant = %variant, "applied node variant");
        }
        for (path, value) in &config.overrides {
            apply_override(&mut materialized, path, value)?;
        }
        if materialized.has_sources() {
            inline_sources(&mut materialized)?;
        }
        materialized.working_dir = None;
        Ok(materialized)
    }
}

/// Accepts "${node.variant}" and bare "node.variant".
fn parse_selector(selector: &str) -> Result<(String, String)> {
    let trimmed = selector
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(selector);
    match trimmed.split_once('.') {
        Some((node, variant)) if !node.is_empty() && !variant.is_empty() => {
            Ok((node.to_string(), variant.to_string()))
        }
        _ => Err(UserError::InvalidVariantSelector(selector.to_string()).into()),
    }
}

fn apply_variant(graph: &mut FlowGraph, node_name: &str, variant_id: &str) -> Result<()> {
    let index = graph
        .node_index(node_name)
        .ok_or_else(|| UserError::NodeNotFound(node_name.to_string()))?;
    let node = &mut graph.nodes[index];
    let variant = node
        .variants
        .get(variant_id)
        .cloned()
        .ok_or_else(|| UserError::VariantNotFound {
            node: node_name.to_string(),
            variant: variant_id.to_string(),
        })?;
    for (name, binding) in variant.inputs {
        node.inputs.insert(name, binding);
    }
    for (key, value) in variant.config {
        node.config.insert(key, value);
    }
    if let Some(source) = variant.source {
        node.source = Some(source);
    }
    Ok(())
}

/// Path format: nodes.<node>.inputs.<name> or nodes.<node>.config.<key>.
/// Config patches deep-merge when both sides are objects.
fn apply_override(graph: &mut FlowGraph, path: &str, value: &Value) -> Result<()> {
    let mut parts = path.splitn(4, '.');
    let (Some("nodes"), Some(node_name), Some(section), Some(key)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(UserError::InvalidOverridePath(path.to_string()).into());
    };
    let index = graph
        .node_index(node_name)
        .ok_or_else(|| UserError::NodeNotFound(node_name.to_string()))?;
    let node = &mut graph.nodes[index];
    match section {
        "inputs" => {
            node.inputs
                .insert(key.to_string(), InputBinding::Literal(value.clone()));
        }
        "config" => {
            let merged = match (node.config.remove(key), value) {
                (Some(Value::Object(mut existing)), Value::Object(patch)) => {
                    deep_merge(&mut existing, patch.clone());
                    Value::Object(existing)
                }
                (_, value) => value.clone(),
            };
            node.config.insert(key.to_string(), merged);
        }
        _ => return Err(UserError::InvalidOverridePath(path.to_string()).into()),
    }
    Ok(())
}

fn deep_merge(existing: &mut HashMap<String, Value>, patch: HashMap<String, Value>) {
    for (key, value) in patch {
        match (existing.remove(&key), value) {
            (Some(Value::Object(mut inner)), Value::Object(patch_inner)) => {
                deep_merge(&mut inner, patch_inner);
                existing.insert(key, Value::Object(inner));
            }
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}

/// Inline each node's source file into its config under "template",
/// reading through a scoped temporary copy of the working directory. The
/// materialized graph keeps only the inlined content — no live path into
/// the copy survives the scope.
fn inline_sources(graph: &mut FlowGraph) -> Result<()> {
    let dir = match &graph.working_dir {
        Some(dir) => dir.clone(),
        None => {
            let node = graph
                .nodes
                .iter()
                .find(|n| n.source.is_some())
                .map(|n| n.name.clone())
                .unwrap_or_default();
            return Err(GraphError::SourceWithoutWorkingDir(node).into());
        }
    };
    let scope = WorkingCopy::new(&dir)?;
    for node in &mut graph.nodes {
        if let Some(source) = node.source.take() {
            let content = fs::read_to_string(scope.path().join(&source))?;
            node.config
                .insert("template".to_string(), Value::String(content));
        }
    }
    Ok(())
    // `scope` drops here and on the error path above, releasing the copy on
    // every exit.
}

/// Scoped temporary copy of a working directory; removed when dropped.
struct WorkingCopy {
    dir: TempDir,
}

impl WorkingCopy {
    fn new(source: &Path) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        copy_dir(source, dir.path())?;
        Ok(Self { dir })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_accepts_wrapped_and_bare_forms() {
        assert_eq!(
            parse_selector("${print_val.variant_1}").unwrap(),
            ("print_val".to_string(), "variant_1".to_string())
        );
        assert_eq!(
            parse_selector("print_val.variant_1").unwrap(),
            ("print_val".to_string(), "variant_1".to_string())
        );
    }

    #[test]
    fn selector_rejects_missing_parts() {
        assert!(parse_selector("${just_a_node}").is_err());
        assert!(parse_selector("${.variant}").is_err());
    }

    #[test]
    fn deep_merge_keeps_unpatched_keys() {
        let mut existing = HashMap::new();
        let mut nested = HashMap::new();
        nested.insert("temperature".to_string(), Value::Number(0.2));
        nested.insert("top_p".to_string(), Value::Number(1.0));
        existing.insert("model".to_string(), Value::Object(nested));

        let mut patch_nested = HashMap::new();
        patch_nested.insert("temperature".to_string(), Value::Number(0.9));
        let mut patch = HashMap::new();
        patch.insert("model".to_string(), Value::Object(patch_nested));

        deep_merge(&mut existing, patch);
        let model = existing["model"].as_object().unwrap();
        assert_eq!(model["temperature"], Value::Number(0.9));
        assert_eq!(model["top_p"], Value::Number(1.0));
    }
}
