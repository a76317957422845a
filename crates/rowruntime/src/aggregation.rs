use crate::scheduler::{NodePhase, NodeScheduler, ScheduleContext};
use rowcore::{
    AggregationRecord, AggregationResult, FlowGraph, ResolvedConnections, Result, RunStorage,
    Value,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Runs aggregation-flagged nodes across the full set of row outputs after
/// all rows complete. The only component that operates over the whole batch
/// rather than a single row.
pub struct AggregationExecutor {
    graph: Arc<FlowGraph>,
    scheduler: NodeScheduler,
    storage: Arc<dyn RunStorage>,
    connections: Arc<ResolvedConnections>,
    environment: HashMap<String, String>,
    raise_ex: bool,
    span: tracing::Span,
}

impl AggregationExecutor {
    pub(crate) fn new(
        graph: Arc<FlowGraph>,
        scheduler: NodeScheduler,
        storage: Arc<dyn RunStorage>,
        connections: Arc<ResolvedConnections>,
        environment: HashMap<String, String>,
        raise_ex: bool,
    ) -> Self {
        let span = tracing::info_span!("aggregation_executor", flow = %graph.name);
        Self {
            graph,
            scheduler,
            storage,
            connections,
            environment,
            raise_ex,
            span,
        }
    }

    pub fn has_aggregation_nodes(&self) -> bool {
        self.graph.nodes.iter().any(|n| n.aggregation)
    }

    /// Run aggregation nodes over the ordered batch of per-row outputs.
    ///
    /// `aggregation_inputs` carries one entry per row in caller-supplied
    /// order; a binding to a non-aggregation node's output resolves to the
    /// ordered array of that node's per-row values, and a flow-input
    /// binding resolves to the ordered array of that input across the
    /// batch. A failure in one aggregation node never prevents the others.
    pub async fn aggregate(
        &self,
        inputs: &HashMap<String, Vec<Value>>,
        aggregation_inputs: &[HashMap<String, Value>],
        run_id: Option<String>,
        node_concurrency: usize,
    ) -> Result<AggregationResult> {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = tracing::info_span!(parent: &self.span, "aggregation", run_id = %run_id);
        self.aggregate_inner(inputs, aggregation_inputs, run_id, node_concurrency)
            .instrument(span)
            .await
    }

    async fn aggregate_inner(
        &self,
        inputs: &HashMap<String, Vec<Value>>,
        aggregation_inputs: &[HashMap<String, Value>],
        run_id: String,
        node_concurrency: usize,
    ) -> Result<AggregationResult> {
        let t0 = Instant::now();

        // One array per referenced node, exactly one entry per row, in the
        // supplied order.
        let referenced: BTreeSet<&String> = aggregation_inputs
            .iter()
            .flat_map(|row| row.keys())
            .collect();
        let mut seed_outputs: HashMap<String, Value> = HashMap::new();
        for name in referenced {
            let values: Vec<Value> = aggregation_inputs
                .iter()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            seed_outputs.insert(name.clone(), Value::Array(values));
        }
        let flow_inputs: HashMap<String, Value> = inputs
            .iter()
            .map(|(name, values)| (name.clone(), Value::Array(values.clone())))
            .collect();

        let sctx = ScheduleContext {
            run_id: run_id.clone(),
            index: None,
            connections: Arc::clone(&self.connections),
            environment: self.environment.clone(),
            streaming: false,
            node_concurrency,
            cancellation: CancellationToken::new(),
            raise_ex: self.raise_ex,
        };
        let outcome = self
            .scheduler
            .execute(
                &self.graph,
                NodePhase::Aggregation,
                &flow_inputs,
                seed_outputs,
                &sctx,
            )
            .await?;

        // Aggregated outputs are always eager values.
        let mut outputs = HashMap::new();
        for (name, output) in outcome.outputs {
            outputs.insert(name, output.into_value().await);
        }
        let statuses = outcome
            .node_run_infos
            .iter()
            .map(|(name, info)| (name.clone(), info.status))
            .collect();
        self.storage.record_aggregation_run(&AggregationRecord {
            run_id: run_id.clone(),
            statuses,
            duration_ms: t0.elapsed().as_millis() as u64,
        });
        tracing::info!(
            nodes = outcome.node_run_infos.len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "aggregation finished"
        );
        Ok(AggregationResult {
            run_id,
            outputs,
            node_run_infos: outcome.node_run_infos,
        })
    }
}
