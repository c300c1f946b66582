use std::fmt;

use thiserror::Error;

use crate::engine::{ConversionError, EngineKey};
use crate::graph::{GraphError, TopologyError, ValueId};

/// Which boundary list an unresolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRole {
    RawInput,
    RawOutput,
    NodeOperand,
    GraphOutput,
}

impl fmt::Display for ValueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueRole::RawInput => "raw input",
            ValueRole::RawOutput => "raw output",
            ValueRole::NodeOperand => "node operand",
            ValueRole::GraphOutput => "graph output",
        };
        f.write_str(label)
    }
}

fn segment_label(segment: &Option<usize>) -> String {
    match segment {
        Some(index) => format!("segment {index}"),
        None => "graph boundary".to_string(),
    }
}

/// Fatal conditions that abort a compilation pass. No partially rewritten unit is ever returned.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("partitioner contract violated at segment {segment}: {detail}")]
    PartitionContract { segment: usize, detail: String },
    #[error(
        "segment {segment} local graph declares {local_inputs} inputs/{local_outputs} outputs \
         but has {raw_inputs} raw inputs/{raw_outputs} raw outputs"
    )]
    SegmentArity {
        segment: usize,
        local_inputs: usize,
        raw_inputs: usize,
        local_outputs: usize,
        raw_outputs: usize,
    },
    #[error("{role} {value} is unresolved at {}", segment_label(.segment))]
    UnresolvedValue {
        segment: Option<usize>,
        value: ValueId,
        role: ValueRole,
    },
    #[error("value {value} is mapped twice (segment {segment})")]
    DuplicateMapping { segment: usize, value: ValueId },
    #[error("converter returned an empty engine for segment {segment}")]
    EmptyEngine { segment: usize },
    #[error(
        "engine for segment {segment} exposes {engine_inputs} inputs/{engine_outputs} outputs, \
         segment needs {raw_inputs}/{raw_outputs}"
    )]
    SlotMismatch {
        segment: usize,
        engine_inputs: usize,
        raw_inputs: usize,
        engine_outputs: usize,
        raw_outputs: usize,
    },
    #[error("conversion of segment {segment} failed: {source}")]
    Conversion {
        segment: usize,
        #[source]
        source: ConversionError,
    },
    #[error("engine attribute {key} registered twice")]
    DuplicateEngine { key: EngineKey },
    #[error("invalid shape hint '{name}': {detail}")]
    InvalidShapeHint { name: String, detail: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("rewritten graph is malformed: {0}")]
    Topology(#[from] TopologyError),
}

pub type CompileResult<T> = Result<T, CompileError>;
