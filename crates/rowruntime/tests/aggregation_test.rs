mod common;

use common::*;
use rowcore::{
    FlowGraph, FlowInput, InputBinding, MemoryRunStorage, NodeDef, NodeStatus, NoopRunStorage,
    Value, ValueKind,
};
use rowruntime::{ExecutorOptions, DEFAULT_NODE_CONCURRENCY};
use std::collections::HashMap;
use std::sync::Arc;

fn batch_graph() -> FlowGraph {
    FlowGraph::new("batch")
        .with_input(FlowInput::required("question", ValueKind::String))
        .with_node(
            NodeDef::new("answer", "test.probe")
                .with_input("value", InputBinding::FlowInput("question".into())),
        )
        .with_node(
            NodeDef::new("collect", "test.probe")
                .with_input("answers", InputBinding::NodeOutput("answer".into()))
                .with_input("questions", InputBinding::FlowInput("question".into()))
                .aggregation(),
        )
}

fn batch_of(values: &[&str]) -> (HashMap<String, Vec<Value>>, Vec<HashMap<String, Value>>) {
    let mut inputs = HashMap::new();
    inputs.insert(
        "question".to_string(),
        values.iter().map(|v| Value::from(*v)).collect(),
    );
    let aggregation_inputs = values
        .iter()
        .map(|v| {
            let mut row = HashMap::new();
            row.insert("answer".to_string(), Value::from(format!("answer:{}", v)));
            row
        })
        .collect();
    (inputs, aggregation_inputs)
}

#[tokio::test]
async fn aggregation_sees_one_entry_per_row_in_order() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let executor = executor_for(
        batch_graph(),
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );
    let (inputs, aggregation_inputs) = batch_of(&["q0", "q1", "q2"]);

    let result = executor
        .exec_aggregation(&inputs, &aggregation_inputs, None, DEFAULT_NODE_CONCURRENCY)
        .await
        .unwrap();

    assert_eq!(
        result.node_run_infos["collect"].status,
        NodeStatus::Completed
    );
    let echoed = result.outputs["collect"].as_object().unwrap();
    let answers = echoed["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0], Value::from("answer:q0"));
    assert_eq!(answers[1], Value::from("answer:q1"));
    assert_eq!(answers[2], Value::from("answer:q2"));
    let questions = echoed["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[2], Value::from("q2"));
}

#[tokio::test]
async fn only_aggregation_nodes_run_in_aggregation() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let executor = executor_for(
        batch_graph(),
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );
    let (inputs, aggregation_inputs) = batch_of(&["q0"]);

    executor
        .exec_aggregation(&inputs, &aggregation_inputs, None, DEFAULT_NODE_CONCURRENCY)
        .await
        .unwrap();

    // The per-row "answer" node is never re-executed.
    assert_eq!(probe.order(), vec!["collect"]);
}

#[tokio::test]
async fn one_failing_aggregation_node_does_not_stop_the_others() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let graph = batch_graph().with_node(
        NodeDef::new("broken", "test.fail")
            .with_input("answers", InputBinding::NodeOutput("answer".into()))
            .aggregation(),
    );
    let storage = Arc::new(MemoryRunStorage::new());
    let executor = executor_for(
        graph,
        registry,
        storage.clone(),
        ExecutorOptions::default(),
    );
    let (inputs, aggregation_inputs) = batch_of(&["q0", "q1"]);

    let result = executor
        .exec_aggregation(&inputs, &aggregation_inputs, None, DEFAULT_NODE_CONCURRENCY)
        .await
        .unwrap();

    assert_eq!(result.node_run_infos["broken"].status, NodeStatus::Failed);
    assert_eq!(
        result.node_run_infos["collect"].status,
        NodeStatus::Completed
    );
    // Both outcomes reached the aggregation record.
    let records = storage.aggregation_runs();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].statuses.len(), 2);
}

#[tokio::test]
async fn aggregation_over_empty_batch_yields_empty_arrays() {
    init_tracing();
    let probe = Probe::new();
    let registry = test_registry(&probe);
    let executor = executor_for(
        batch_graph(),
        registry,
        Arc::new(NoopRunStorage),
        ExecutorOptions::default(),
    );
    let mut inputs = HashMap::new();
    inputs.insert("question".to_string(), Vec::new());

    let result = executor
        .exec_aggregation(&inputs, &[], None, DEFAULT_NODE_CONCURRENCY)
        .await
        .unwrap();

    let echoed = result.outputs["collect"].as_object().unwrap();
    assert_eq!(echoed["questions"], Value::Array(vec![]));
}
