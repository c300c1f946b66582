use tracing::debug;

use crate::compile::cloner::clone_node;
use crate::compile::engine_call::{build_engine_call, OutputMode};
use crate::compile::error::{CompileError, CompileResult, ValueRole};
use crate::compile::options::ShapeHints;
use crate::compile::remap::ValueRemapper;
use crate::compile::segment::{Segment, SegmentTarget};
use crate::engine::{EngineKey, EngineTable, SubgraphConverter};
use crate::graph::Graph;
use crate::hashing::content_digest;

/// Mutable state threaded through the stitching of every segment of one pass.
pub struct StitchContext<'a> {
    pub original: &'a Graph,
    pub dst: &'a mut Graph,
    pub remapper: &'a mut ValueRemapper,
    pub engines: &'a mut EngineTable,
    pub converter: &'a dyn SubgraphConverter,
    pub hints: &'a ShapeHints,
    pub engine_prefix: &'a str,
}

/// Splices `segment` into the destination graph.
///
/// Fallback segments are cloned node by node. Native segments are converted into an engine and
/// replaced by a single call site whose unpacked results stand in for the segment's raw outputs.
pub fn stitch_segment(segment: &Segment, cx: &mut StitchContext<'_>) -> CompileResult<()> {
    debug!(
        segment = segment.index(),
        target = %segment.target(),
        nodes = segment.nodes().len(),
        raw_inputs = segment.raw_inputs().len(),
        raw_outputs = segment.raw_outputs().len(),
        "stitching segment"
    );
    match segment.target() {
        SegmentTarget::HostFallback => stitch_fallback(segment, cx),
        SegmentTarget::NativeEngine => stitch_native(segment, cx),
    }
}

fn stitch_fallback(segment: &Segment, cx: &mut StitchContext<'_>) -> CompileResult<()> {
    for node in segment.nodes() {
        clone_node(cx.original, *node, cx.dst, cx.remapper)
            .map_err(|err| segment.remap_error(err, ValueRole::NodeOperand))?;
    }
    Ok(())
}

fn stitch_native(segment: &Segment, cx: &mut StitchContext<'_>) -> CompileResult<()> {
    let local = segment.local_graph(cx.original)?;
    let hints = cx.hints.for_segment(cx.original, segment.raw_inputs());

    let engine = cx
        .converter
        .convert(&local, &hints)
        .map_err(|source| CompileError::Conversion {
            segment: segment.index(),
            source,
        })?;

    let engine_inputs = engine.input_slots().len();
    let engine_outputs = engine.output_slots().len();
    if engine_inputs == 0 && engine_outputs == 0 && !segment.raw_outputs().is_empty() {
        return Err(CompileError::EmptyEngine {
            segment: segment.index(),
        });
    }
    if engine_inputs != segment.raw_inputs().len()
        || engine_outputs != segment.raw_outputs().len()
    {
        return Err(CompileError::SlotMismatch {
            segment: segment.index(),
            engine_inputs,
            raw_inputs: segment.raw_inputs().len(),
            engine_outputs,
            raw_outputs: segment.raw_outputs().len(),
        });
    }

    let mut resolved_inputs = Vec::with_capacity(segment.raw_inputs().len());
    for raw in segment.raw_inputs() {
        let value = cx
            .remapper
            .resolve_existing(cx.original, *raw, cx.dst)
            .map_err(|err| segment.remap_error(err, ValueRole::RawInput))?;
        resolved_inputs.push(value);
    }

    let key = EngineKey::new(
        cx.engine_prefix,
        segment.index() as u32,
        content_digest(local.as_ref()),
    );
    debug!(
        segment = segment.index(),
        engine = %key,
        name = engine.name(),
        converter = cx.converter.name(),
        converter_version = cx.converter.version(),
        "registered engine"
    );
    let call = build_engine_call(
        engine,
        key,
        &resolved_inputs,
        segment.raw_outputs().len(),
        cx.dst,
        cx.engines,
        OutputMode::Stitched,
    )?;

    for (raw, unpacked) in segment.raw_outputs().iter().zip(call.outputs) {
        cx.remapper
            .insert(*raw, unpacked)
            .map_err(|err| segment.remap_error(err, ValueRole::RawOutput))?;
    }
    Ok(())
}
