mod common;

use common::*;
use rowcore::{
    EngineError, FlowGraph, FlowInput, FlowOutput, InputBinding, MemoryRunStorage, NodeDef,
    NodeStatus, NoopRunStorage, RowStatus, Value, ValueKind,
};
use rowruntime::{ExecutorOptions, RowOptions};
use std::collections::HashMap;
use std::sync::Arc;

fn chain_graph() -> FlowGraph {
    FlowGraph::new("chain")
        .with_input(FlowInput::required("seed", ValueKind::String))
        .with_node(
            NodeDef::new("a", "test.probe")
                .with_input("value", InputBinding::FlowInput("seed".into()))
                .with_config("delay_ms", 20.0),
        )
        .with_node(
            NodeDef::new("b", "test.probe")
                .with_input("value", InputBinding::NodeOutput("a".into()))
                .with_config("delay_ms", 20.0),
        )
        .with_node(
            NodeDef::new("c", "test.probe")
                .with_input("value", InputBinding::NodeOutput("b".into())),
        )
        .with_output(FlowOutput::from_node("result", "c"))
}

fn seed_row() -> HashMap<String, Value> {
    let mut row = HashMap::new();
    row.insert("seed".to_string(), Value::from("x"));
    row
}

#[tokio::test]
async fn nodes_run_in_dependency_order() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let executor = executor_for(
        chain_graph(),
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let result = executor
        .exec_row(seed_row(), Some(0), RowOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, RowStatus::Completed);
    assert_eq!(probe.order(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn dispatch_never_exceeds_node_concurrency() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let mut graph = FlowGraph::new("wide");
    for i in 0..6 {
        graph = graph.with_node(
            NodeDef::new(format!("n{}", i), "test.probe").with_config("delay_ms", 50.0),
        );
    }
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let opts = RowOptions {
        node_concurrency: 2,
        ..RowOptions::default()
    };
    let result = executor.exec_row(HashMap::new(), Some(0), opts).await.unwrap();

    assert_eq!(result.status, RowStatus::Completed);
    assert_eq!(result.node_run_infos.len(), 6);
    assert!(
        probe.max_concurrent() <= 2,
        "observed {} concurrent nodes",
        probe.max_concurrent()
    );
}

#[tokio::test]
async fn simultaneously_ready_nodes_follow_declaration_order() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("roots")
        .with_node(NodeDef::new("first", "test.probe"))
        .with_node(NodeDef::new("second", "test.probe"))
        .with_node(NodeDef::new("third", "test.probe"));
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let opts = RowOptions {
        node_concurrency: 1,
        ..RowOptions::default()
    };
    executor.exec_row(HashMap::new(), Some(0), opts).await.unwrap();

    assert_eq!(probe.order(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn failed_node_skips_dependents_and_fails_row() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("failing")
        .with_node(NodeDef::new("a", "test.probe").with_literal("value", "ok"))
        .with_node(
            NodeDef::new("b", "test.fail")
                .with_input("value", InputBinding::NodeOutput("a".into())),
        )
        .with_node(
            NodeDef::new("c", "test.probe")
                .with_input("value", InputBinding::NodeOutput("b".into())),
        );
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let result = executor
        .exec_row(HashMap::new(), Some(0), RowOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, RowStatus::Failed);
    assert_eq!(result.node_status("a"), Some(NodeStatus::Completed));
    assert_eq!(result.node_status("b"), Some(NodeStatus::Failed));
    assert_eq!(result.node_status("c"), Some(NodeStatus::Skipped));
    // c never executed
    assert_eq!(probe.order(), vec!["a"]);
    assert!(result.error.unwrap().contains("deterministic failure"));
}

#[tokio::test]
async fn skip_propagates_transitively() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("cascade")
        .with_node(NodeDef::new("bad", "test.fail"))
        .with_node(
            NodeDef::new("mid", "test.probe")
                .with_input("value", InputBinding::NodeOutput("bad".into())),
        )
        .with_node(
            NodeDef::new("leaf", "test.probe")
                .with_input("value", InputBinding::NodeOutput("mid".into())),
        );
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let result = executor
        .exec_row(HashMap::new(), Some(0), RowOptions::default())
        .await
        .unwrap();

    assert_eq!(result.node_status("mid"), Some(NodeStatus::Skipped));
    assert_eq!(result.node_status("leaf"), Some(NodeStatus::Skipped));
    assert!(probe.order().is_empty());
}

#[tokio::test]
async fn independent_sibling_continues_after_failure() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("siblings")
        .with_node(NodeDef::new("bad", "test.fail"))
        .with_node(NodeDef::new("good", "test.probe").with_literal("value", "still runs"));
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let result = executor
        .exec_row(HashMap::new(), Some(0), RowOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, RowStatus::Failed);
    assert_eq!(result.node_status("good"), Some(NodeStatus::Completed));
    assert_eq!(probe.order(), vec!["good"]);
}

#[tokio::test]
async fn error_tolerant_node_runs_with_sentinel_input() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("tolerant")
        .with_node(NodeDef::new("bad", "test.fail"))
        .with_node(
            NodeDef::new("survivor", "test.probe")
                .with_input("value", InputBinding::NodeOutput("bad".into()))
                .tolerate_errors(),
        );
    let executor = executor_for(
        graph,
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );

    let result = executor
        .exec_row(HashMap::new(), Some(0), RowOptions::default())
        .await
        .unwrap();

    assert_eq!(result.node_status("survivor"), Some(NodeStatus::Completed));
    // The survivor saw a Null sentinel standing in for the failed output.
    let info = &result.node_run_infos["survivor"];
    let echoed = info.output.as_ref().unwrap().as_object().unwrap();
    assert_eq!(echoed["value"], Value::Null);
    // The failure still marks the row.
    assert_eq!(result.status, RowStatus::Failed);
}

#[tokio::test]
async fn strict_mode_raises_on_first_failure() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = FlowGraph::new("strict")
        .with_node(NodeDef::new("a", "test.probe").with_literal("value", "ok"))
        .with_node(
            NodeDef::new("b", "test.fail")
                .with_input("value", InputBinding::NodeOutput("a".into())),
        );
    let options = ExecutorOptions {
        raise_ex: true,
        ..ExecutorOptions::default()
    };
    let executor = executor_for(graph, registry, Arc::new(NoopRunStorage), options);

    let err = executor
        .exec_row(HashMap::new(), Some(0), RowOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Tool(_)));
}

#[tokio::test]
async fn every_node_outcome_reaches_storage() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let storage = Arc::new(MemoryRunStorage::new());
    let executor = executor_for(
        chain_graph(),
        registry,
        storage.clone(),
        ExecutorOptions::default(),
    );

    executor
        .exec_row(seed_row(), Some(3), RowOptions::default())
        .await
        .unwrap();

    let node_runs = storage.node_runs();
    assert_eq!(node_runs.len(), 3);
    assert!(node_runs.iter().all(|r| r.index == Some(3)));
    assert_eq!(storage.row_runs().len(), 1);
}
