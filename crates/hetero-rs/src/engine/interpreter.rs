use std::fmt;
use std::sync::Arc;

use super::{
    ConversionError, ConversionResult, EngineHandle, EngineInstance, EngineTable, SlotDesc,
    SubgraphConverter,
};
use crate::compile::options::ShapeHints;
use crate::graph::{Graph, TensorLiteral};
use crate::hashing::content_digest;
use crate::runtime::{execute_graph, BackendError, BackendResult, HostExecutor, RuntimeValue};

/// Converter that keeps the segment graph and evaluates it with a host executor.
///
/// Useful wherever a real accelerator backend is unavailable: the resulting engine computes
/// exactly what the fallback path would.
pub struct InterpreterConverter<E> {
    name: String,
    executor: Arc<E>,
}

impl<E: HostExecutor + 'static> InterpreterConverter<E> {
    pub fn new(executor: E) -> Self {
        Self::with_name("interpreter", Arc::new(executor))
    }

    pub fn with_name(name: impl Into<String>, executor: Arc<E>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }
}

impl<E: HostExecutor + 'static> SubgraphConverter for InterpreterConverter<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, graph: &Graph, hints: &ShapeHints) -> ConversionResult<EngineHandle> {
        graph
            .validate()
            .map_err(|err| ConversionError::new(format!("segment graph is malformed: {err}")))?;

        let mut inputs = Vec::with_capacity(graph.inputs().len());
        for (index, value) in graph.inputs().iter().enumerate() {
            let ty = graph
                .value_type(*value)
                .map_err(|err| ConversionError::new(err.to_string()))?;
            let slot = SlotDesc::input(index, ty.clone());
            if let (Some(range), Some(spec)) = (hints.get(&slot.name), ty.as_tensor()) {
                if range.rank() != spec.shape.rank() {
                    return Err(ConversionError::new(format!(
                        "hint for {} has rank {}, slot has rank {}",
                        slot.name,
                        range.rank(),
                        spec.shape.rank()
                    )));
                }
            }
            inputs.push(slot);
        }

        let mut outputs = Vec::with_capacity(graph.outputs().len());
        for (index, value) in graph.outputs().iter().enumerate() {
            let ty = graph
                .value_type(*value)
                .map_err(|err| ConversionError::new(err.to_string()))?;
            if ty.as_tensor().is_none() {
                return Err(ConversionError::new(format!(
                    "output {index} has non-tensor type {ty}"
                )));
            }
            outputs.push(SlotDesc::output(index, ty.clone()));
        }

        let executor: Arc<dyn HostExecutor> = self.executor.clone();
        Ok(Arc::new(InterpretedEngine {
            name: format!("{}-{:016x}", self.name, content_digest(graph)),
            graph: graph.clone(),
            inputs,
            outputs,
            executor,
        }))
    }
}

/// Engine evaluating an owned graph on the host.
pub struct InterpretedEngine {
    name: String,
    graph: Graph,
    inputs: Vec<SlotDesc>,
    outputs: Vec<SlotDesc>,
    executor: Arc<dyn HostExecutor>,
}

impl fmt::Debug for InterpretedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpretedEngine")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("nodes", &self.graph.node_count())
            .finish()
    }
}

impl EngineInstance for InterpretedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_slots(&self) -> &[SlotDesc] {
        &self.inputs
    }

    fn output_slots(&self) -> &[SlotDesc] {
        &self.outputs
    }

    fn forward(&self, inputs: &[TensorLiteral]) -> BackendResult<Vec<TensorLiteral>> {
        if inputs.len() != self.inputs.len() {
            return Err(BackendError::arity(
                format!("inputs of engine {}", self.name),
                self.inputs.len(),
                inputs.len(),
            ));
        }
        for (slot, literal) in self.inputs.iter().zip(inputs) {
            let Some(expected) = slot.ty.as_tensor().and_then(|spec| spec.byte_len()) else {
                continue;
            };
            if expected != literal.byte_len() {
                return Err(BackendError::execution(format!(
                    "{} of engine {} expects {expected} bytes, got {}",
                    slot.name,
                    self.name,
                    literal.byte_len()
                )));
            }
        }
        let values = inputs.iter().cloned().map(RuntimeValue::Tensor).collect();
        execute_graph(&self.graph, &EngineTable::new(), self.executor.as_ref(), values)?
            .into_iter()
            .map(RuntimeValue::into_tensor)
            .collect()
    }
}
