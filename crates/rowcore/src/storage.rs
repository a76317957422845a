use crate::{NodeRunInfo, NodeStatus, RowStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Row-level execution record handed to storage.
#[derive(Debug, Clone, Serialize)]
pub struct RowRecord {
    pub run_id: String,
    pub index: Option<usize>,
    pub variant_id: Option<String>,
    pub status: RowStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Aggregation-level execution record handed to storage.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationRecord {
    pub run_id: String,
    pub statuses: HashMap<String, NodeStatus>,
    pub duration_ms: u64,
}

/// Append-only sink for execution telemetry. The engine writes records and
/// never reads them back; implementations must accept concurrent appends.
pub trait RunStorage: Send + Sync {
    fn record_node_run(&self, record: &NodeRunInfo);
    fn record_row_run(&self, record: &RowRecord);
    fn record_aggregation_run(&self, record: &AggregationRecord);
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NoopRunStorage;

impl RunStorage for NoopRunStorage {
    fn record_node_run(&self, _record: &NodeRunInfo) {}
    fn record_row_run(&self, _record: &RowRecord) {}
    fn record_aggregation_run(&self, _record: &AggregationRecord) {}
}

/// Keeps records in memory, mainly for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemoryRunStorage {
    node_runs: Mutex<Vec<NodeRunInfo>>,
    row_runs: Mutex<Vec<RowRecord>>,
    aggregation_runs: Mutex<Vec<AggregationRecord>>,
}

impl MemoryRunStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_runs(&self) -> Vec<NodeRunInfo> {
        self.node_runs.lock().expect("storage poisoned").clone()
    }

    pub fn row_runs(&self) -> Vec<RowRecord> {
        self.row_runs.lock().expect("storage poisoned").clone()
    }

    pub fn aggregation_runs(&self) -> Vec<AggregationRecord> {
        self.aggregation_runs
            .lock()
            .expect("storage poisoned")
            .clone()
    }
}

impl RunStorage for MemoryRunStorage {
    fn record_node_run(&self, record: &NodeRunInfo) {
        self.node_runs
            .lock()
            .expect("storage poisoned")
            .push(record.clone());
    }

    fn record_row_run(&self, record: &RowRecord) {
        self.row_runs
            .lock()
            .expect("storage poisoned")
            .push(record.clone());
    }

    fn record_aggregation_run(&self, record: &AggregationRecord) {
        self.aggregation_runs
            .lock()
            .expect("storage poisoned")
            .push(record.clone());
    }
}
