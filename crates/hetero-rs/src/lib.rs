//! Heterogeneous subgraph extraction and recompilation.
//!
//! A host [`graph::Graph`] is split into segments by a [`partition::Partitioner`]; the
//! [`compile::Compiler`] clones fallback segments, turns native segments into engines through a
//! [`engine::SubgraphConverter`] and returns a [`unit::CompiledUnit`] whose entry graph calls
//! those engines.

pub mod compile;
pub mod engine;
mod env;
pub mod graph;
pub mod hashing;
pub mod partition;
pub mod runtime;
pub mod unit;

pub use compile::{
    build_standalone_unit, compile, CompileError, CompileOptions, CompileResult, Compiler,
    Segment, SegmentTarget, ShapeHints, ShapeRange,
};
pub use engine::{EngineHandle, EngineInstance, EngineKey, SlotDesc, SubgraphConverter};
pub use graph::{Graph, Node, NodeId, Operation, ValueId, ValueType};
pub use partition::{validate_partition, ContiguousPartitioner, Partitioner};
pub use runtime::{BackendError, BackendResult, HostExecutor, RuntimeValue};
pub use unit::{CompiledUnit, Signature};
