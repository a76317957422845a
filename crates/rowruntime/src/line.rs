use crate::scheduler::{
    NodePhase, NodeScheduler, ScheduleContext, ScheduleOutcome, CANCEL_GRACE,
    DEFAULT_NODE_CONCURRENCY,
};
use rowcore::{
    FlowGraph, InputBinding, NodeStatus, Output, ResolvedConnections, Result, RowRecord,
    RowResult, RowStatus, RunStorage, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Default wall-clock budget for one row execution.
pub const DEFAULT_LINE_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-row execution options.
#[derive(Debug, Clone)]
pub struct RowOptions {
    /// Run identifier; a fresh v4 uuid when absent.
    pub run_id: Option<String>,
    /// Variant identifier recorded with the row run.
    pub variant_id: Option<String>,
    /// Check the row against the flow's declared input schema before
    /// scheduling.
    pub validate_inputs: bool,
    pub node_concurrency: usize,
    /// When false, every lazily-produced output is fully drained before the
    /// row result returns; when true, terminal streams are returned
    /// un-drained and closing them passes to the caller.
    pub allow_generator_output: bool,
}

impl Default for RowOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            variant_id: None,
            validate_inputs: true,
            node_concurrency: DEFAULT_NODE_CONCURRENCY,
            allow_generator_output: false,
        }
    }
}

pub type StreamPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Drives one end-to-end row execution: input validation, scheduling under
/// a wall-clock budget, and output materialization.
pub struct LineExecutor {
    graph: Arc<FlowGraph>,
    scheduler: NodeScheduler,
    storage: Arc<dyn RunStorage>,
    connections: Arc<ResolvedConnections>,
    environment: HashMap<String, String>,
    streaming: bool,
    stream_required: Option<StreamPredicate>,
    line_timeout: Duration,
    raise_ex: bool,
    span: tracing::Span,
}

impl LineExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: Arc<FlowGraph>,
        scheduler: NodeScheduler,
        storage: Arc<dyn RunStorage>,
        connections: Arc<ResolvedConnections>,
        environment: HashMap<String, String>,
        streaming: bool,
        line_timeout: Duration,
        raise_ex: bool,
    ) -> Self {
        let span = tracing::info_span!("line_executor", flow = %graph.name);
        Self {
            graph,
            scheduler,
            storage,
            connections,
            environment,
            streaming,
            stream_required: None,
            line_timeout,
            raise_ex,
            span,
        }
    }

    pub(crate) fn set_stream_predicate(&mut self, predicate: StreamPredicate) {
        self.stream_required = Some(predicate);
    }

    /// Execute one input row through the materialized graph.
    pub async fn execute(
        &self,
        inputs: HashMap<String, Value>,
        index: Option<usize>,
        opts: RowOptions,
    ) -> Result<RowResult> {
        let run_id = opts
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = tracing::info_span!(parent: &self.span, "row", run_id = %run_id, index = ?index);
        self.execute_inner(inputs, index, run_id, opts)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        inputs: HashMap<String, Value>,
        index: Option<usize>,
        run_id: String,
        opts: RowOptions,
    ) -> Result<RowResult> {
        let t0 = Instant::now();
        let inputs = if opts.validate_inputs {
            match self.graph.validate_row_inputs(&inputs) {
                Ok(resolved) => resolved,
                // A schema mismatch is a user error and short-circuits
                // without invoking the scheduler.
                Err(err) => {
                    if self.raise_ex {
                        return Err(err.into());
                    }
                    let result = RowResult {
                        run_id,
                        index,
                        status: RowStatus::Failed,
                        outputs: HashMap::new(),
                        node_run_infos: HashMap::new(),
                        duration_ms: t0.elapsed().as_millis() as u64,
                        error: Some(err.to_string()),
                    };
                    self.record_row(&result, &opts);
                    return Ok(result);
                }
            }
        } else {
            inputs
        };

        let streaming = self.streaming
            || self
                .stream_required
                .as_ref()
                .map(|predicate| predicate())
                .unwrap_or(false);
        let token = CancellationToken::new();
        let sctx = ScheduleContext {
            run_id: run_id.clone(),
            index,
            connections: Arc::clone(&self.connections),
            environment: self.environment.clone(),
            streaming,
            node_concurrency: opts.node_concurrency,
            cancellation: token.clone(),
            raise_ex: self.raise_ex,
        };

        let sched = self
            .scheduler
            .execute(&self.graph, NodePhase::Row, &inputs, HashMap::new(), &sctx);
        tokio::pin!(sched);

        let (outcome, timed_out) = tokio::select! {
            res = &mut sched => (res?, false),
            _ = tokio::time::sleep(self.line_timeout) => {
                tracing::warn!("line timeout expired, cancelling in-flight nodes");
                token.cancel();
                // The scheduler hands back partial results once its grace
                // period runs out; the extra margin bounds a task that
                // refuses to yield.
                match tokio::time::timeout(CANCEL_GRACE * 2, &mut sched).await {
                    Ok(res) => (res?, true),
                    Err(_) => (ScheduleOutcome::default(), true),
                }
            }
        };

        let status = if timed_out || outcome.canceled {
            RowStatus::Timeout
        } else if outcome.failed {
            RowStatus::Failed
        } else {
            RowStatus::Completed
        };

        let mut outputs = materialize_outputs(&self.graph, outcome.outputs, &inputs);
        if !opts.allow_generator_output {
            let mut drained = HashMap::new();
            for (name, output) in outputs {
                drained.insert(name, Output::Value(output.into_value().await));
            }
            outputs = drained;
        }

        let error = match status {
            RowStatus::Completed => None,
            RowStatus::Timeout => Some(format!(
                "line execution timed out after {}s",
                self.line_timeout.as_secs()
            )),
            RowStatus::Failed => outcome
                .node_run_infos
                .values()
                .find(|info| info.status == NodeStatus::Failed)
                .and_then(|info| info.error.clone()),
        };

        let result = RowResult {
            run_id,
            index,
            status,
            outputs,
            node_run_infos: outcome.node_run_infos,
            duration_ms: t0.elapsed().as_millis() as u64,
            error,
        };
        self.record_row(&result, &opts);
        tracing::info!(status = ?result.status, duration_ms = result.duration_ms, "row finished");
        Ok(result)
    }

    fn record_row(&self, result: &RowResult, opts: &RowOptions) {
        self.storage.record_row_run(&RowRecord {
            run_id: result.run_id.clone(),
            index: result.index,
            variant_id: opts.variant_id.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
            error: result.error.clone(),
        });
    }
}

/// Evaluate the flow's output bindings against what the schedule produced.
/// Outputs fed by nodes that never completed are absent rather than Null.
fn materialize_outputs(
    graph: &FlowGraph,
    mut node_outputs: HashMap<String, Output>,
    inputs: &HashMap<String, Value>,
) -> HashMap<String, Output> {
    let mut outputs = HashMap::new();
    for output in &graph.outputs {
        match &output.binding {
            InputBinding::Literal(value) => {
                outputs.insert(output.name.clone(), Output::Value(value.clone()));
            }
            InputBinding::FlowInput(name) => {
                if let Some(value) = inputs.get(name) {
                    outputs.insert(output.name.clone(), Output::Value(value.clone()));
                }
            }
            InputBinding::NodeOutput(node) => {
                // A stream moves out: it has exactly one consumer. Values
                // stay cloneable for repeated references.
                if matches!(node_outputs.get(node), Some(Output::Stream(_))) {
                    if let Some(stream) = node_outputs.remove(node) {
                        outputs.insert(output.name.clone(), stream);
                    }
                } else if let Some(Output::Value(value)) = node_outputs.get(node) {
                    outputs.insert(output.name.clone(), Output::Value(value.clone()));
                }
            }
        }
    }
    outputs
}
