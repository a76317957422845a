use crate::aggregation::AggregationExecutor;
use crate::line::{LineExecutor, RowOptions, DEFAULT_LINE_TIMEOUT};
use crate::registry::ToolRegistry;
use crate::scheduler::{ensure_acyclic, NodeScheduler};
use crate::variant::VariantResolver;
use rowcore::{
    AggregationResult, ConnectionCache, ConnectionProvider, ExecutionConfig, FlowGraph,
    GraphError, Result, RowResult, RunStorage, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Executor-level options.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Strict mode: the first unrecoverable failure aborts and surfaces to
    /// the caller instead of being captured in result statuses.
    pub raise_ex: bool,
    /// Wall-clock budget for one row execution.
    pub line_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            raise_ex: false,
            line_timeout: DEFAULT_LINE_TIMEOUT,
        }
    }
}

/// Front door of the engine.
///
/// Materializes the variant once, resolves connections through the cache,
/// and hands rows to the line executor and batches to the aggregation
/// executor. Rows may run concurrently under a caller-controlled outer
/// bound; the resolved connection map and the storage sink are shared
/// across them.
pub struct FlowExecutor {
    graph: Arc<FlowGraph>,
    line: LineExecutor,
    aggregation: AggregationExecutor,
}

impl FlowExecutor {
    pub fn new(
        graph: FlowGraph,
        config: ExecutionConfig,
        registry: Arc<ToolRegistry>,
        provider: &dyn ConnectionProvider,
        storage: Arc<dyn RunStorage>,
        options: ExecutorOptions,
    ) -> Result<Self> {
        let cache = ConnectionCache::new();
        Self::with_connection_cache(graph, config, registry, provider, &cache, storage, options)
    }

    /// Like [`FlowExecutor::new`], reusing a caller-shared connection cache
    /// so identical configurations resolve once across executors.
    #[allow(clippy::too_many_arguments)]
    pub fn with_connection_cache(
        graph: FlowGraph,
        config: ExecutionConfig,
        registry: Arc<ToolRegistry>,
        provider: &dyn ConnectionProvider,
        cache: &ConnectionCache,
        storage: Arc<dyn RunStorage>,
        options: ExecutorOptions,
    ) -> Result<Self> {
        graph.validate()?;
        ensure_acyclic(&graph)?;
        let graph = Arc::new(VariantResolver::resolve(&graph, &config)?);
        for node in &graph.nodes {
            if !registry.contains(&node.tool) {
                return Err(GraphError::UnknownToolType(node.tool.clone()).into());
            }
        }
        let connections = cache.resolve(&config, provider)?;

        let line = LineExecutor::new(
            Arc::clone(&graph),
            NodeScheduler::new(Arc::clone(&registry), Arc::clone(&storage)),
            Arc::clone(&storage),
            Arc::clone(&connections),
            config.environment_variables.clone(),
            config.streaming,
            options.line_timeout,
            options.raise_ex,
        );
        let aggregation = AggregationExecutor::new(
            Arc::clone(&graph),
            NodeScheduler::new(registry, Arc::clone(&storage)),
            storage,
            connections,
            config.environment_variables,
            options.raise_ex,
        );
        Ok(Self {
            graph,
            line,
            aggregation,
        })
    }

    /// The materialized graph this executor runs.
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Install the caller's per-row streaming predicate; it decides whether
    /// terminal outputs are exposed incrementally or buffered.
    pub fn enable_streaming(&mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) {
        self.line.set_stream_predicate(Arc::new(predicate));
    }

    /// Execute one input row through the materialized graph.
    pub async fn exec_row(
        &self,
        inputs: HashMap<String, Value>,
        index: Option<usize>,
        opts: RowOptions,
    ) -> Result<RowResult> {
        self.line.execute(inputs, index, opts).await
    }

    /// Run aggregation nodes across the full, ordered batch of row outputs.
    pub async fn exec_aggregation(
        &self,
        inputs: &HashMap<String, Vec<Value>>,
        aggregation_inputs: &[HashMap<String, Value>],
        run_id: Option<String>,
        node_concurrency: usize,
    ) -> Result<AggregationResult> {
        self.aggregation
            .aggregate(inputs, aggregation_inputs, run_id, node_concurrency)
            .await
    }

    pub fn has_aggregation_nodes(&self) -> bool {
        self.aggregation.has_aggregation_nodes()
    }
}
