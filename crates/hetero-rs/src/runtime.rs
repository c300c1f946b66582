//! Evaluation of rewritten graphs.
//!
//! The runtime interprets the structural operators emitted by the rewrite (attribute reads,
//! list packing, engine calls, tuple packing) and hands every other operator to a
//! [`HostExecutor`].

use std::sync::Arc;

use thiserror::Error;

use crate::engine::{EngineHandle, EngineTable};
use crate::graph::{Graph, Node, Operation, TensorLiteral};

/// Error surfaced while executing a graph or an engine.
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: String, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
    #[error("{context}: expected {expected} values, got {found}")]
    Arity {
        context: String,
        expected: usize,
        found: usize,
    },
}

impl BackendError {
    pub fn unimplemented(op: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }

    pub fn arity(context: impl Into<String>, expected: usize, found: usize) -> Self {
        BackendError::Arity {
            context: context.into(),
            expected,
            found,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Runtime value flowing along a graph edge.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Tensor(TensorLiteral),
    List(Vec<RuntimeValue>),
    Tuple(Vec<RuntimeValue>),
    Engine(EngineHandle),
}

impl RuntimeValue {
    pub fn as_tensor(&self) -> Option<&TensorLiteral> {
        match self {
            RuntimeValue::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> BackendResult<TensorLiteral> {
        match self {
            RuntimeValue::Tensor(tensor) => Ok(tensor),
            other => Err(BackendError::execution(format!(
                "expected tensor value, found {}",
                other.kind_name()
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            RuntimeValue::Tensor(_) => "tensor",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Tuple(_) => "tuple",
            RuntimeValue::Engine(_) => "engine",
        }
    }
}

/// Executes host operators on dense tensors.
pub trait HostExecutor: Send + Sync {
    fn execute(&self, node: &Node, inputs: &[TensorLiteral]) -> BackendResult<Vec<TensorLiteral>>;
}

/// Evaluates `graph` in program order and returns its registered outputs.
pub fn execute_graph(
    graph: &Graph,
    engines: &EngineTable,
    executor: &dyn HostExecutor,
    inputs: Vec<RuntimeValue>,
) -> BackendResult<Vec<RuntimeValue>> {
    if inputs.len() != graph.inputs().len() {
        return Err(BackendError::arity(
            "graph inputs",
            graph.inputs().len(),
            inputs.len(),
        ));
    }

    graph
        .validate()
        .map_err(|err| BackendError::execution(format!("malformed graph: {err}")))?;

    let mut env: Vec<Option<RuntimeValue>> = vec![None; graph.value_count()];
    for (id, value) in graph.inputs().iter().zip(inputs) {
        if let Some(slot) = env.get_mut(id.0 as usize) {
            *slot = Some(value);
        }
    }

    for node in graph.nodes() {
        let operands = node
            .inputs
            .iter()
            .map(|id| {
                env.get(id.0 as usize).cloned().flatten().ok_or_else(|| {
                    BackendError::execution(format!("value {id} read before definition"))
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let results = eval_node(node, operands, engines, executor)?;
        if results.len() != node.outputs.len() {
            return Err(BackendError::arity(
                format!("results of node {}", node.id),
                node.outputs.len(),
                results.len(),
            ));
        }
        for (id, value) in node.outputs.iter().zip(results) {
            if let Some(slot) = env.get_mut(id.0 as usize) {
                *slot = Some(value);
            }
        }
    }

    graph
        .outputs()
        .iter()
        .map(|id| {
            env.get(id.0 as usize)
                .cloned()
                .flatten()
                .ok_or_else(|| BackendError::execution(format!("output {id} never produced")))
        })
        .collect()
}

fn eval_node(
    node: &Node,
    mut operands: Vec<RuntimeValue>,
    engines: &EngineTable,
    executor: &dyn HostExecutor,
) -> BackendResult<Vec<RuntimeValue>> {
    match &node.op {
        Operation::Constant(literal) => Ok(vec![RuntimeValue::Tensor(literal.clone())]),
        Operation::GetAttr { key } => {
            let engine = engines
                .get(key)
                .ok_or_else(|| BackendError::execution(format!("unknown engine attribute {key}")))?;
            Ok(vec![RuntimeValue::Engine(Arc::clone(engine))])
        }
        Operation::ListConstruct => Ok(vec![RuntimeValue::List(operands)]),
        Operation::TupleConstruct => Ok(vec![RuntimeValue::Tuple(operands)]),
        Operation::ListUnpack { count } => match operands.pop() {
            Some(RuntimeValue::List(items)) if items.len() == *count => Ok(items),
            Some(RuntimeValue::List(items)) => {
                Err(BackendError::arity("list unpack", *count, items.len()))
            }
            _ => Err(BackendError::execution("list unpack expects a list operand")),
        },
        Operation::ExecuteEngine => {
            let engine = match operands.pop() {
                Some(RuntimeValue::Engine(engine)) => engine,
                _ => return Err(BackendError::execution("engine call expects an engine handle")),
            };
            let tensors = match operands.pop() {
                Some(RuntimeValue::List(items)) => items
                    .into_iter()
                    .map(RuntimeValue::into_tensor)
                    .collect::<BackendResult<Vec<_>>>()?,
                _ => return Err(BackendError::execution("engine call expects an input list")),
            };
            if tensors.len() != engine.input_slots().len() {
                return Err(BackendError::arity(
                    format!("inputs of engine {}", engine.name()),
                    engine.input_slots().len(),
                    tensors.len(),
                ));
            }
            let outputs = engine.forward(&tensors)?;
            if outputs.len() != engine.output_slots().len() {
                return Err(BackendError::arity(
                    format!("outputs of engine {}", engine.name()),
                    engine.output_slots().len(),
                    outputs.len(),
                ));
            }
            Ok(vec![RuntimeValue::List(
                outputs.into_iter().map(RuntimeValue::Tensor).collect(),
            )])
        }
        _ => {
            let tensors = operands
                .into_iter()
                .map(RuntimeValue::into_tensor)
                .collect::<BackendResult<Vec<_>>>()?;
            let outputs = executor.execute(node, &tensors)?;
            Ok(outputs.into_iter().map(RuntimeValue::Tensor).collect())
        }
    }
}
