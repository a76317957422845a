use crate::registry::ToolRegistry;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use rowcore::{
    EngineError, FlowGraph, GraphError, InputBinding, NodeRunInfo, NodeStatus, Output,
    ResolvedConnections, Result, RunStorage, ToolContext, ToolError, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default bound on concurrently executing node bodies.
pub const DEFAULT_NODE_CONCURRENCY: usize = 16;

/// How long in-flight node tasks get to observe cancellation before being
/// aborted outright.
pub(crate) const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Which subset of the graph one scheduler invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    /// Per-row nodes; aggregation nodes are excluded.
    Row,
    /// Aggregation nodes only, indexed over the whole batch.
    Aggregation,
}

/// Per-invocation context threaded into every node task.
#[derive(Clone)]
pub struct ScheduleContext {
    pub run_id: String,
    pub index: Option<usize>,
    pub connections: Arc<ResolvedConnections>,
    pub environment: HashMap<String, String>,
    pub streaming: bool,
    pub node_concurrency: usize,
    pub cancellation: CancellationToken,
    pub raise_ex: bool,
}

/// Everything one scheduler invocation produced.
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    /// Per-node outputs; terminal outputs may still be lazy streams.
    pub outputs: HashMap<String, Output>,
    pub node_run_infos: HashMap<String, NodeRunInfo>,
    /// At least one node body failed or was skipped downstream of a failure.
    pub failed: bool,
    /// Cancellation was observed before the subset completed.
    pub canceled: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Canceled,
}

impl NodeState {
    fn terminal(self) -> bool {
        !matches!(self, NodeState::Pending | NodeState::Running)
    }

    fn failed_like(self) -> bool {
        matches!(
            self,
            NodeState::Failed | NodeState::Skipped | NodeState::Canceled
        )
    }
}

struct TaskDone {
    index: usize,
    result: std::result::Result<Output, ToolError>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_ms: u64,
}

/// Executes the nodes of one materialized graph for one invocation.
///
/// Maintains a ready set of nodes whose upstream dependencies have all
/// reached a terminal state and dispatches them through a bounded set of
/// spawned tasks; the dispatch loop reacts to completion events and never
/// blocks on a node body. Among simultaneously-ready nodes, dispatch
/// follows graph declaration order (an assumption, not observable
/// contract).
pub struct NodeScheduler {
    registry: Arc<ToolRegistry>,
    storage: Arc<dyn RunStorage>,
    span: tracing::Span,
}

impl NodeScheduler {
    pub fn new(registry: Arc<ToolRegistry>, storage: Arc<dyn RunStorage>) -> Self {
        Self {
            registry,
            storage,
            span: tracing::info_span!("node_scheduler"),
        }
    }

    pub async fn execute(
        &self,
        graph: &FlowGraph,
        phase: NodePhase,
        flow_inputs: &HashMap<String, Value>,
        seed_outputs: HashMap<String, Value>,
        ctx: &ScheduleContext,
    ) -> Result<ScheduleOutcome> {
        let span = self.span.clone();
        self.execute_inner(graph, phase, flow_inputs, seed_outputs, ctx)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        graph: &FlowGraph,
        phase: NodePhase,
        flow_inputs: &HashMap<String, Value>,
        seed_outputs: HashMap<String, Value>,
        ctx: &ScheduleContext,
    ) -> Result<ScheduleOutcome> {
        ensure_acyclic(graph)?;
        let subset: Vec<usize> = graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.aggregation == (phase == NodePhase::Aggregation))
            .map(|(i, _)| i)
            .collect();
        tracing::info!(
            run_id = %ctx.run_id,
            nodes = subset.len(),
            "starting node schedule"
        );

        let mut states: HashMap<usize, NodeState> =
            subset.iter().map(|&i| (i, NodeState::Pending)).collect();
        let mut outputs: HashMap<String, Output> = HashMap::new();
        let mut infos: HashMap<String, NodeRunInfo> = HashMap::new();
        let mut running: FuturesUnordered<JoinHandle<TaskDone>> = FuturesUnordered::new();
        let mut first_error: Option<ToolError> = None;
        let mut canceled = false;

        loop {
            // Settle skip cascades before dispatching: a node whose required
            // input comes from a failed or skipped producer is marked Skipped
            // without running, unless it tolerates errors.
            loop {
                let mut progressed = false;
                for &i in &subset {
                    if states[&i] != NodeState::Pending {
                        continue;
                    }
                    let deps = subset_deps(graph, &subset, i);
                    if deps.iter().any(|d| !states[d].terminal()) {
                        continue;
                    }
                    let upstream_failed = deps.iter().any(|d| states[d].failed_like());
                    if upstream_failed && !graph.nodes[i].tolerate_errors {
                        states.insert(i, NodeState::Skipped);
                        let info = NodeRunInfo::unexecuted(
                            graph.nodes[i].name.as_str(),
                            NodeStatus::Skipped,
                            ctx.run_id.as_str(),
                            ctx.index,
                        );
                        tracing::info!(node = %graph.nodes[i].name, "node skipped: upstream failure");
                        self.storage.record_node_run(&info);
                        infos.insert(graph.nodes[i].name.clone(), info);
                        progressed = true;
                    }
                }
                if !progressed {
                    break;
                }
            }

            // Dispatch ready nodes in declaration order, up to the bound.
            // An error-tolerant node whose producer failed runs here with
            // Null sentinels standing in for the missing outputs.
            if !canceled {
                for &i in &subset {
                    if running.len() >= ctx.node_concurrency {
                        break;
                    }
                    if states[&i] != NodeState::Pending {
                        continue;
                    }
                    let deps = subset_deps(graph, &subset, i);
                    if deps.iter().any(|d| !states[d].terminal()) {
                        continue;
                    }
                    let node = &graph.nodes[i];
                    let inputs =
                        resolve_inputs(graph, i, flow_inputs, &seed_outputs, &outputs, &states);
                    let tool = self.registry.create_tool(&node.tool, &node.config)?;
                    let tctx = ToolContext {
                        node: node.name.clone(),
                        inputs,
                        config: node.config.clone(),
                        connections: ctx
                            .connections
                            .get(&node.name)
                            .cloned()
                            .unwrap_or_default(),
                        environment: ctx.environment.clone(),
                        streaming: ctx.streaming,
                        index: ctx.index,
                        cancellation: ctx.cancellation.clone(),
                    };
                    let token = ctx.cancellation.clone();
                    let index = i;
                    let task = async move {
                        let started_at = Utc::now();
                        let t0 = Instant::now();
                        let result = tokio::select! {
                            biased;
                            _ = token.cancelled() => Err(ToolError::Cancelled),
                            r = tool.execute(tctx) => r,
                        };
                        TaskDone {
                            index,
                            result,
                            started_at,
                            ended_at: Utc::now(),
                            duration_ms: t0.elapsed().as_millis() as u64,
                        }
                    };
                    tracing::debug!(node = %node.name, "dispatching node");
                    states.insert(i, NodeState::Running);
                    running.push(tokio::spawn(task));
                }
            }

            if running.is_empty() {
                if canceled {
                    for &i in &subset {
                        if states[&i] == NodeState::Pending {
                            states.insert(i, NodeState::Canceled);
                            let info = NodeRunInfo::unexecuted(
                                graph.nodes[i].name.as_str(),
                                NodeStatus::Canceled,
                                ctx.run_id.as_str(),
                                ctx.index,
                            );
                            self.storage.record_node_run(&info);
                            infos.insert(graph.nodes[i].name.clone(), info);
                        }
                    }
                    break;
                }
                if subset.iter().any(|&i| states[&i] == NodeState::Pending) {
                    return Err(EngineError::System(
                        "no nodes are ready for execution, but the flow is not completed"
                            .to_string(),
                    ));
                }
                break;
            }

            // React to the next completion event, or to row cancellation.
            let joined = tokio::select! {
                Some(joined) = running.next() => joined,
                _ = ctx.cancellation.cancelled(), if !canceled => {
                    canceled = true;
                    self.drain_after_cancel(
                        graph, &subset, &mut running, &mut states, &mut infos, &mut outputs,
                        ctx, &mut first_error,
                    )
                    .await;
                    continue;
                }
            };
            let done = joined
                .map_err(|e| EngineError::System(format!("node task join error: {}", e)))?;
            self.complete(
                done,
                graph,
                &subset,
                &mut states,
                &mut infos,
                &mut outputs,
                ctx,
                &mut first_error,
            )
            .await;

            if ctx.raise_ex {
                if let Some(err) = first_error.take() {
                    ctx.cancellation.cancel();
                    return Err(EngineError::Tool(err));
                }
            }
        }

        let failed = subset
            .iter()
            .any(|&i| matches!(states[&i], NodeState::Failed | NodeState::Skipped));
        // A cancelled schedule finalizes as a Timeout status upstream even
        // in strict mode; timeout is never surfaced as an exception.
        if ctx.raise_ex && !canceled {
            if let Some(err) = first_error {
                ctx.cancellation.cancel();
                return Err(EngineError::Tool(err));
            }
        }
        Ok(ScheduleOutcome {
            outputs,
            node_run_infos: infos,
            failed,
            canceled,
        })
    }

    /// Fold one finished task back into the schedule state.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        done: TaskDone,
        graph: &FlowGraph,
        subset: &[usize],
        states: &mut HashMap<usize, NodeState>,
        infos: &mut HashMap<String, NodeRunInfo>,
        outputs: &mut HashMap<String, Output>,
        ctx: &ScheduleContext,
        first_error: &mut Option<ToolError>,
    ) {
        let node = &graph.nodes[done.index];
        match done.result {
            Ok(output) => {
                // A stream consumed by a downstream node is drained eagerly;
                // only terminal outputs stay lazy.
                let output = match output {
                    Output::Stream(stream)
                        if graph.has_dependents_within(done.index, subset) =>
                    {
                        Output::Value(stream.drain().await)
                    }
                    other => other,
                };
                let info = NodeRunInfo {
                    node: node.name.clone(),
                    status: NodeStatus::Completed,
                    output: output.as_value().cloned(),
                    error: None,
                    run_id: ctx.run_id.clone(),
                    index: ctx.index,
                    started_at: done.started_at,
                    ended_at: done.ended_at,
                    duration_ms: done.duration_ms,
                };
                tracing::info!(node = %node.name, duration_ms = done.duration_ms, "node completed");
                states.insert(done.index, NodeState::Completed);
                self.storage.record_node_run(&info);
                infos.insert(node.name.clone(), info);
                outputs.insert(node.name.clone(), output);
            }
            Err(ToolError::Cancelled) => {
                let info = NodeRunInfo {
                    node: node.name.clone(),
                    status: NodeStatus::Canceled,
                    output: None,
                    error: Some(ToolError::Cancelled.to_string()),
                    run_id: ctx.run_id.clone(),
                    index: ctx.index,
                    started_at: done.started_at,
                    ended_at: done.ended_at,
                    duration_ms: done.duration_ms,
                };
                tracing::info!(node = %node.name, "node cancelled");
                states.insert(done.index, NodeState::Canceled);
                self.storage.record_node_run(&info);
                infos.insert(node.name.clone(), info);
            }
            Err(err) => {
                let info = NodeRunInfo {
                    node: node.name.clone(),
                    status: NodeStatus::Failed,
                    output: None,
                    error: Some(err.to_string()),
                    run_id: ctx.run_id.clone(),
                    index: ctx.index,
                    started_at: done.started_at,
                    ended_at: done.ended_at,
                    duration_ms: done.duration_ms,
                };
                tracing::error!(node = %node.name, error = %err, "node failed");
                states.insert(done.index, NodeState::Failed);
                self.storage.record_node_run(&info);
                infos.insert(node.name.clone(), info);
                if first_error.is_none() {
                    *first_error = Some(err);
                }
            }
        }
    }

    /// Give in-flight tasks a bounded grace period to observe the token,
    /// then abort whatever is left.
    #[allow(clippy::too_many_arguments)]
    async fn drain_after_cancel(
        &self,
        graph: &FlowGraph,
        subset: &[usize],
        running: &mut FuturesUnordered<JoinHandle<TaskDone>>,
        states: &mut HashMap<usize, NodeState>,
        infos: &mut HashMap<String, NodeRunInfo>,
        outputs: &mut HashMap<String, Output>,
        ctx: &ScheduleContext,
        first_error: &mut Option<ToolError>,
    ) {
        let deadline = tokio::time::Instant::now() + CANCEL_GRACE;
        loop {
            match tokio::time::timeout_at(deadline, running.next()).await {
                Ok(Some(joined)) => {
                    if let Ok(done) = joined {
                        self.complete(
                            done, graph, subset, states, infos, outputs, ctx, first_error,
                        )
                        .await;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("cancel grace expired, aborting in-flight node tasks");
                    for handle in running.iter() {
                        handle.abort();
                    }
                    while let Some(joined) = running.next().await {
                        if let Ok(done) = joined {
                            self.complete(
                                done, graph, subset, states, infos, outputs, ctx, first_error,
                            )
                            .await;
                        }
                    }
                    break;
                }
            }
        }
        // Tasks that never reported (aborted mid-flight) finalize as
        // canceled.
        for &i in subset {
            if states[&i] == NodeState::Running {
                states.insert(i, NodeState::Canceled);
                let info = NodeRunInfo::unexecuted(
                    graph.nodes[i].name.as_str(),
                    NodeStatus::Canceled,
                    ctx.run_id.as_str(),
                    ctx.index,
                );
                self.storage.record_node_run(&info);
                infos.insert(graph.nodes[i].name.clone(), info);
            }
        }
    }
}

/// Dependencies of `index` restricted to the executing subset; producers
/// outside the subset are satisfied through seed outputs.
fn subset_deps(graph: &FlowGraph, subset: &[usize], index: usize) -> Vec<usize> {
    graph
        .dependencies(index)
        .into_iter()
        .filter(|d| subset.contains(d))
        .collect()
}

fn resolve_inputs(
    graph: &FlowGraph,
    index: usize,
    flow_inputs: &HashMap<String, Value>,
    seed_outputs: &HashMap<String, Value>,
    outputs: &HashMap<String, Output>,
    states: &HashMap<usize, NodeState>,
) -> HashMap<String, Value> {
    let mut resolved = HashMap::new();
    for (name, binding) in &graph.nodes[index].inputs {
        let value = match binding {
            InputBinding::Literal(v) => v.clone(),
            InputBinding::FlowInput(input) => {
                flow_inputs.get(input).cloned().unwrap_or(Value::Null)
            }
            InputBinding::NodeOutput(node) => match graph.node_index(node) {
                Some(dep) if states.contains_key(&dep) => match states[&dep] {
                    NodeState::Completed => outputs
                        .get(node)
                        .and_then(Output::as_value)
                        .cloned()
                        .unwrap_or(Value::Null),
                    // Sentinel for a failed or skipped producer feeding an
                    // error-tolerant consumer.
                    _ => Value::Null,
                },
                _ => seed_outputs.get(node).cloned().unwrap_or(Value::Null),
            },
        };
        resolved.insert(name.clone(), value);
    }
    resolved
}

/// Cycle check over the whole graph's dependency edges.
pub(crate) fn ensure_acyclic(graph: &FlowGraph) -> std::result::Result<(), GraphError> {
    let mut dg: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<_> = (0..graph.nodes.len()).map(|i| dg.add_node(i)).collect();
    for i in 0..graph.nodes.len() {
        for dep in graph.dependencies(i) {
            dg.add_edge(indices[dep], indices[i], ());
        }
    }
    toposort(&dg, None)
        .map(|_| ())
        .map_err(|_| GraphError::CyclicDependency)
}
