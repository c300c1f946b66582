use std::sync::Arc;

use crate::compile::error::{CompileError, CompileResult};
use crate::engine::{EngineHandle, EngineKey, EngineTable};
use crate::graph::{Graph, ValueId, ValueType};

/// How the results of an engine call are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The call is one segment among several: results stay individually addressable and are
    /// not registered as graph outputs.
    Stitched,
    /// The call is the whole unit: results are registered as the graph's outputs, several
    /// results wrapped in a single tuple.
    Standalone,
}

/// Values emitted for one engine call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub engine: ValueId,
    pub input_list: ValueId,
    pub result_list: ValueId,
    pub outputs: Vec<ValueId>,
    pub tuple: Option<ValueId>,
}

/// Materializes the call site of `engine` at the end of `graph`.
///
/// Registers the engine on `host` under `key`, then emits
/// `GetAttr -> ListConstruct(inputs) -> ExecuteEngine -> ListUnpack(output_count)`; in
/// [`OutputMode::Standalone`] the unpacked values (or one tuple over them) become the graph's
/// outputs.
pub fn build_engine_call(
    engine: EngineHandle,
    key: EngineKey,
    resolved_inputs: &[ValueId],
    output_count: usize,
    graph: &mut Graph,
    host: &mut EngineTable,
    mode: OutputMode,
) -> CompileResult<EngineCall> {
    let output_types = engine
        .output_slots()
        .iter()
        .map(|slot| slot.ty.clone())
        .collect::<Vec<ValueType>>();
    if output_types.len() != output_count {
        return Err(CompileError::SlotMismatch {
            segment: key.ordinal as usize,
            engine_inputs: engine.input_slots().len(),
            raw_inputs: resolved_inputs.len(),
            engine_outputs: output_types.len(),
            raw_outputs: output_count,
        });
    }

    host.register(key.clone(), Arc::clone(&engine))
        .map_err(|key| CompileError::DuplicateEngine { key })?;

    let engine_value = graph.create_get_attr(key)?;
    let input_list = graph.create_list(resolved_inputs.to_vec())?;
    let result_list = graph.create_execute_engine(input_list, engine_value, output_types)?;
    let outputs = graph.create_list_unpack(result_list, output_count)?;

    let mut tuple = None;
    if mode == OutputMode::Standalone {
        if outputs.len() > 1 {
            let packed = graph.create_tuple(outputs.clone())?;
            graph.register_output(packed)?;
            tuple = Some(packed);
        } else {
            for output in &outputs {
                graph.register_output(*output)?;
            }
        }
    }

    Ok(EngineCall {
        engine: engine_value,
        input_list,
        result_list,
        outputs,
        tuple,
    })
}
