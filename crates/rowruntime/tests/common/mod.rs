#![allow(dead_code)]

use async_trait::async_trait;
use rowcore::{
    ExecutionConfig, FlowGraph, Output, OutputStream, RunStorage, StaticConnectionProvider, Tool,
    ToolContext, ToolError, Value,
};
use rowruntime::{ExecutorOptions, FlowExecutor, ToolFactory, ToolRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Shared probe recording execution order and observed concurrency.
#[derive(Default)]
pub struct Probe {
    order: Mutex<Vec<String>>,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(&self, node: &str) {
        self.order.lock().unwrap().push(node.to_string());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

/// Records its invocation, sleeps for config "delay_ms" if set, and emits
/// either the config "emit" value or an object of its resolved inputs.
pub struct ProbeTool {
    probe: Arc<Probe>,
}

#[async_trait]
impl Tool for ProbeTool {
    fn tool_type(&self) -> &str {
        "test.probe"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        self.probe.enter(&ctx.node);
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as u64;
        if delay_ms > 0 {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => {
                    self.probe.exit();
                    return Err(ToolError::Cancelled);
                }
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
        self.probe.exit();
        let output = match ctx.config.get("emit") {
            Some(value) => value.clone(),
            None => Value::Object(ctx.inputs.clone()),
        };
        Ok(Output::Value(output))
    }
}

pub struct ProbeToolFactory(pub Arc<Probe>);

impl ToolFactory for ProbeToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(ProbeTool {
            probe: Arc::clone(&self.0),
        }))
    }

    fn tool_type(&self) -> &str {
        "test.probe"
    }
}

/// Fails deterministically.
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn tool_type(&self) -> &str {
        "test.fail"
    }

    async fn execute(&self, _ctx: ToolContext) -> Result<Output, ToolError> {
        Err(ToolError::ExecutionFailed("deterministic failure".into()))
    }
}

pub struct FailToolFactory;

impl ToolFactory for FailToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(FailTool))
    }

    fn tool_type(&self) -> &str {
        "test.fail"
    }
}

/// Returns its "text" input as a chunked stream when streaming is
/// requested, buffered otherwise.
pub struct StreamTool;

#[async_trait]
impl Tool for StreamTool {
    fn tool_type(&self) -> &str {
        "test.stream"
    }

    async fn execute(&self, ctx: ToolContext) -> Result<Output, ToolError> {
        let text = ctx
            .require_input("text")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        if !ctx.streaming {
            return Ok(Output::Value(Value::String(text)));
        }
        let chunks: Vec<Value> = text
            .chars()
            .collect::<Vec<char>>()
            .chunks(4)
            .map(|chunk| Value::String(chunk.iter().collect()))
            .collect();
        Ok(Output::Stream(OutputStream::from_values(chunks)))
    }
}

pub struct StreamToolFactory;

impl ToolFactory for StreamToolFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(StreamTool))
    }

    fn tool_type(&self) -> &str {
        "test.stream"
    }
}

pub fn test_registry(probe: &Arc<Probe>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ProbeToolFactory(Arc::clone(probe))));
    registry.register(Arc::new(FailToolFactory));
    registry.register(Arc::new(StreamToolFactory));
    Arc::new(registry)
}

pub fn executor_for(
    graph: FlowGraph,
    registry: Arc<ToolRegistry>,
    storage: Arc<dyn RunStorage>,
    options: ExecutorOptions,
) -> FlowExecutor {
    FlowExecutor::new(
        graph,
        ExecutionConfig::default(),
        registry,
        &StaticConnectionProvider::new(),
        storage,
        options,
    )
    .expect("executor construction failed")
}
