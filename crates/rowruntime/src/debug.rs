use crate::registry::ToolRegistry;
use chrono::Utc;
use rowcore::{
    ConnectionValue, EngineError, FlowGraph, InputBinding, NodeRunInfo, NodeStatus, Result,
    RunStorage, ToolContext, UserError, Value,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Executes exactly one node in isolation, with caller-supplied values
/// standing in for its upstream dependencies. No upstream node is ever
/// invoked.
pub struct SingleNodeDebugger {
    registry: Arc<ToolRegistry>,
    storage: Arc<dyn RunStorage>,
    span: tracing::Span,
}

impl SingleNodeDebugger {
    pub fn new(registry: Arc<ToolRegistry>, storage: Arc<dyn RunStorage>) -> Self {
        Self {
            registry,
            storage,
            span: tracing::info_span!("single_node_debugger"),
        }
    }

    /// Run `node_name` against substitute upstream outputs.
    ///
    /// When `artifact_dir` is supplied, the node run record is also written
    /// to `<artifact_dir>/<node>.detail.json`; that write is a side effect
    /// outside the returned value's contract.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_single(
        &self,
        graph: &FlowGraph,
        node_name: &str,
        flow_inputs: &HashMap<String, Value>,
        substitute_outputs: &HashMap<String, Value>,
        connections: HashMap<String, ConnectionValue>,
        raise_ex: bool,
        artifact_dir: Option<&Path>,
    ) -> Result<NodeRunInfo> {
        let node = graph
            .find_node(node_name)
            .ok_or_else(|| UserError::NodeNotFound(node_name.to_string()))?;
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(parent: &self.span, "single_node", node = %node_name, run_id = %run_id);

        let mut inputs = HashMap::new();
        for (name, binding) in &node.inputs {
            let value = match binding {
                InputBinding::Literal(value) => value.clone(),
                InputBinding::FlowInput(input) => {
                    flow_inputs.get(input).cloned().unwrap_or(Value::Null)
                }
                InputBinding::NodeOutput(dep) => substitute_outputs
                    .get(dep)
                    .cloned()
                    .ok_or_else(|| UserError::MissingSubstituteOutput(dep.clone()))?,
            };
            inputs.insert(name.clone(), value);
        }

        let tool = self.registry.create_tool(&node.tool, &node.config)?;
        let tctx = ToolContext {
            node: node.name.clone(),
            inputs,
            config: node.config.clone(),
            connections,
            environment: HashMap::new(),
            streaming: false,
            index: None,
            cancellation: CancellationToken::new(),
        };

        let started_at = Utc::now();
        let t0 = Instant::now();
        let result = tool.execute(tctx).instrument(span).await;
        let (status, output, error) = match result {
            Ok(output) => (NodeStatus::Completed, Some(output.into_value().await), None),
            Err(err) => {
                if raise_ex {
                    return Err(EngineError::Tool(err));
                }
                (NodeStatus::Failed, None, Some(err.to_string()))
            }
        };

        let info = NodeRunInfo {
            node: node.name.clone(),
            status,
            output,
            error,
            run_id,
            index: None,
            started_at,
            ended_at: Utc::now(),
            duration_ms: t0.elapsed().as_millis() as u64,
        };
        self.storage.record_node_run(&info);

        if let Some(dir) = artifact_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.detail.json", node.name));
            std::fs::write(path, serde_json::to_string_pretty(&info)?)?;
        }
        Ok(info)
    }
}
