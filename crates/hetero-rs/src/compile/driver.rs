use std::sync::Arc;

use tracing::{debug, debug_span, info};

use crate::compile::engine_call::{build_engine_call, OutputMode};
use crate::compile::error::{CompileError, CompileResult, ValueRole};
use crate::compile::options::CompileOptions;
use crate::compile::remap::{RemapError, ValueRemapper};
use crate::compile::segment::Segment;
use crate::compile::stitch::{stitch_segment, StitchContext};
use crate::engine::{EngineHandle, EngineKey, EngineTable, SubgraphConverter};
use crate::env;
use crate::graph::Graph;
use crate::hashing::content_digest;
use crate::partition::{validate_partition, Partitioner};
use crate::unit::CompiledUnit;

type GraphObserver = Box<dyn Fn(&str) + Send + Sync>;

/// Rewrites host graphs into compiled units, converting native segments with one converter.
pub struct Compiler {
    options: CompileOptions,
    converter: Arc<dyn SubgraphConverter>,
    observer: Option<GraphObserver>,
}

impl Compiler {
    pub fn new(converter: Arc<dyn SubgraphConverter>) -> Self {
        Self::with_options(converter, CompileOptions::default())
    }

    pub fn with_options(converter: Arc<dyn SubgraphConverter>, options: CompileOptions) -> Self {
        Self {
            options,
            converter,
            observer: None,
        }
    }

    /// Registers a callback receiving the textual form of every finished graph.
    pub fn with_graph_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn converter(&self) -> &Arc<dyn SubgraphConverter> {
        &self.converter
    }

    /// Partitions `graph` and compiles the result.
    pub fn compile(
        &self,
        graph: &Graph,
        partitioner: &dyn Partitioner,
    ) -> CompileResult<CompiledUnit> {
        graph.validate()?;
        self.options.shape_hints.validate_against(graph)?;
        let segments = partitioner.partition(graph)?;
        self.compile_partition(graph, &segments)
    }

    /// Compiles `graph` against an already computed partition.
    pub fn compile_segments(
        &self,
        graph: &Graph,
        segments: &[Segment],
    ) -> CompileResult<CompiledUnit> {
        graph.validate()?;
        self.options.shape_hints.validate_against(graph)?;
        self.compile_partition(graph, segments)
    }

    fn compile_partition(
        &self,
        graph: &Graph,
        segments: &[Segment],
    ) -> CompileResult<CompiledUnit> {
        let span = debug_span!("compile", unit = %self.options.unit_name);
        let _guard = span.enter();

        validate_partition(graph, segments)?;

        let mut rewritten = Graph::new();
        let mut engines = EngineTable::new();
        let mut remapper = ValueRemapper::for_source(graph);

        for input in graph.inputs() {
            remapper
                .resolve(graph, *input, &mut rewritten)
                .map_err(|err| boundary_error(err, ValueRole::RawInput))?;
        }
        remapper.seal();

        {
            let mut cx = StitchContext {
                original: graph,
                dst: &mut rewritten,
                remapper: &mut remapper,
                engines: &mut engines,
                converter: self.converter.as_ref(),
                hints: &self.options.shape_hints,
                engine_prefix: &self.options.engine_prefix,
            };
            for segment in segments {
                stitch_segment(segment, &mut cx)?;
            }
        }

        for output in graph.outputs() {
            let value = remapper
                .resolve_existing(graph, *output, &mut rewritten)
                .map_err(|err| boundary_error(err, ValueRole::GraphOutput))?;
            rewritten.register_output(value)?;
        }

        if self.options.should_validate() {
            rewritten.validate()?;
        }
        self.observe(&rewritten);

        info!(
            unit = %self.options.unit_name,
            segments = segments.len(),
            engines = engines.len(),
            nodes = rewritten.node_count(),
            "compiled unit"
        );
        Ok(CompiledUnit::new(
            self.options.unit_name.clone(),
            self.options.entry_name.clone(),
            rewritten,
            engines,
        ))
    }

    fn observe(&self, graph: &Graph) {
        match &self.observer {
            Some(observer) => observer(&graph.to_text()),
            None if env::dump_graph_enabled() => {
                debug!(unit = %self.options.unit_name, graph = %graph, "rewritten graph");
            }
            None => {}
        }
    }
}

/// Compiles `graph` with `converter` and default options.
pub fn compile(
    graph: &Graph,
    partitioner: &dyn Partitioner,
    converter: Arc<dyn SubgraphConverter>,
) -> CompileResult<CompiledUnit> {
    Compiler::new(converter).compile(graph, partitioner)
}

/// Wraps a single engine into a unit whose entry graph is exactly one engine call.
///
/// Entry inputs mirror the engine's input slots. A single result is returned directly;
/// several results are packed into one tuple, which becomes the sole output.
pub fn build_standalone_unit(
    engine: EngineHandle,
    options: &CompileOptions,
) -> CompileResult<CompiledUnit> {
    let mut graph = Graph::new();
    let inputs = engine
        .input_slots()
        .iter()
        .map(|slot| graph.add_named_input(slot.name.clone(), slot.ty.clone()))
        .collect::<Vec<_>>();

    let digest = content_digest(&(engine.name(), engine.input_slots(), engine.output_slots()));
    let key = EngineKey::new(options.engine_prefix.clone(), 0, digest);
    let output_count = engine.output_slots().len();
    let mut engines = EngineTable::new();
    build_engine_call(
        engine,
        key,
        &inputs,
        output_count,
        &mut graph,
        &mut engines,
        OutputMode::Standalone,
    )?;

    if options.should_validate() {
        graph.validate()?;
    }
    Ok(CompiledUnit::new(
        options.unit_name.clone(),
        options.entry_name.clone(),
        graph,
        engines,
    ))
}

fn boundary_error(err: RemapError, role: ValueRole) -> CompileError {
    match err {
        RemapError::Unresolved { value } | RemapError::AlreadyMapped { value, .. } => {
            CompileError::UnresolvedValue {
                segment: None,
                value,
                role,
            }
        }
        RemapError::Graph(err) => CompileError::Graph(err),
    }
}
