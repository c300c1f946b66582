//! Subgraph extraction and recompilation.
//!
//! A compilation pass walks the segments of a partitioned graph in program order. Fallback
//! segments are cloned into the rewritten graph, native segments are converted into engines
//! and replaced by a single call site. One [`remap::ValueRemapper`] threads every original
//! value through the pass.

pub mod cloner;
pub mod driver;
pub mod engine_call;
pub mod error;
pub mod options;
pub mod remap;
pub mod segment;
pub mod stitch;

pub use cloner::clone_node;
pub use driver::{build_standalone_unit, compile, Compiler};
pub use engine_call::{build_engine_call, EngineCall, OutputMode};
pub use error::{CompileError, CompileResult, ValueRole};
pub use options::{CompileOptions, ShapeHints, ShapeRange};
pub use remap::{RemapError, ValueRemapper};
pub use segment::{Segment, SegmentTarget};
pub use stitch::{stitch_segment, StitchContext};
