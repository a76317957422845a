//! Row-level flow execution runtime
//!
//! This crate provides the engine that runs a materialized flow graph once
//! per input row: bounded-concurrency node scheduling, per-row timeouts and
//! cancellation, variant materialization, batch aggregation, and
//! single-node debugging.

mod aggregation;
mod debug;
mod executor;
mod line;
mod registry;
mod scheduler;
mod variant;

pub use aggregation::AggregationExecutor;
pub use debug::SingleNodeDebugger;
pub use executor::{ExecutorOptions, FlowExecutor};
pub use line::{LineExecutor, RowOptions, StreamPredicate, DEFAULT_LINE_TIMEOUT};
pub use registry::{PortDefinition, ToolFactory, ToolMetadata, ToolRegistry};
pub use scheduler::{
    NodePhase, NodeScheduler, ScheduleContext, ScheduleOutcome, DEFAULT_NODE_CONCURRENCY,
};
pub use variant::VariantResolver;
