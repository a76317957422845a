use crate::{Output, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Terminal state of one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Completed,
    Failed,
    Skipped,
    Canceled,
}

/// Terminal state of one row execution. Timeout is a status, not an error,
/// so callers branch without unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Completed,
    Failed,
    Timeout,
}

/// Record of one node execution within a row or aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRunInfo {
    pub node: String,
    pub status: NodeStatus,
    /// Drained output snapshot; `None` for failed/skipped nodes and for
    /// terminal outputs still held as undrained streams.
    pub output: Option<Value>,
    pub error: Option<String>,
    pub run_id: String,
    pub index: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl NodeRunInfo {
    /// Record for a node that never ran (skipped or canceled before start).
    pub fn unexecuted(
        node: impl Into<String>,
        status: NodeStatus,
        run_id: impl Into<String>,
        index: Option<usize>,
    ) -> Self {
        let now = Utc::now();
        Self {
            node: node.into(),
            status,
            output: None,
            error: None,
            run_id: run_id.into(),
            index,
            started_at: now,
            ended_at: now,
            duration_ms: 0,
        }
    }
}

/// Result of executing one input row through the materialized graph.
#[derive(Debug)]
pub struct RowResult {
    pub run_id: String,
    pub index: Option<usize>,
    pub status: RowStatus,
    /// Flow outputs; lazy streams only when generator output was allowed.
    pub outputs: HashMap<String, Output>,
    pub node_run_infos: HashMap<String, NodeRunInfo>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RowResult {
    pub fn node_status(&self, node: &str) -> Option<NodeStatus> {
        self.node_run_infos.get(node).map(|info| info.status)
    }

    /// Materialize every output to an eager value, draining any streams.
    pub async fn into_value_outputs(self) -> HashMap<String, Value> {
        let mut values = HashMap::new();
        for (name, output) in self.outputs {
            values.insert(name, output.into_value().await);
        }
        values
    }
}

/// Result of running aggregation nodes over the whole batch of rows.
#[derive(Debug)]
pub struct AggregationResult {
    pub run_id: String,
    pub outputs: HashMap<String, Value>,
    pub node_run_infos: HashMap<String, NodeRunInfo>,
}
