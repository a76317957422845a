//! Core abstractions for the rowflow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the flow graph data model, execution configuration,
//! connections, results, the run-storage sink, and the tool capability
//! interface.

mod config;
mod connection;
mod error;
mod flow;
mod result;
mod storage;
mod stream;
mod tool;
mod value;

pub use config::{ConnectionInput, ExecutionConfig};
pub use connection::{
    Connection, ConnectionCache, ConnectionProvider, ConnectionValue, ResolvedConnections,
    StaticConnectionProvider,
};
pub use error::{EngineError, GraphError, ToolError, UserError};
pub use flow::{FlowGraph, FlowInput, FlowOutput, InputBinding, NodeDef, VariantDef};
pub use result::{AggregationResult, NodeRunInfo, NodeStatus, RowResult, RowStatus};
pub use storage::{AggregationRecord, MemoryRunStorage, NoopRunStorage, RowRecord, RunStorage};
pub use stream::{Output, OutputStream};
pub use tool::{Tool, ToolContext};
pub use value::{Value, ValueKind};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
