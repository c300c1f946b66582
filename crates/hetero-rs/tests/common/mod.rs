#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hetero_rs::engine::{
    ConversionError, ConversionResult, EngineHandle, EngineInstance, InterpreterConverter,
    SlotDesc, SubgraphConverter,
};
use hetero_rs::graph::utils::{f32_tensor, literal_f32_values, tensor_literal_f32};
use hetero_rs::graph::{
    BinaryOp, CustomAttr, CustomSpec, Graph, Node, Operation, SplitSpec, TensorLiteral, UnaryOp,
    ValueId,
};
use hetero_rs::runtime::{BackendError, BackendResult, HostExecutor, RuntimeValue};
use hetero_rs::ShapeHints;

/// Elementwise f32 executor covering the operators used by the fixtures.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToyExecutor;

impl ToyExecutor {
    fn unary(op: UnaryOp, x: f32) -> f32 {
        match op {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Sqrt => x.sqrt(),
        }
    }

    fn binary(op: BinaryOp, a: f32, b: f32) -> f32 {
        match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
        }
    }
}

fn values(literal: &TensorLiteral) -> BackendResult<Vec<f32>> {
    literal_f32_values(literal).ok_or_else(|| BackendError::execution("expected f32 tensor"))
}

fn dims(literal: &TensorLiteral) -> BackendResult<Vec<usize>> {
    literal
        .spec
        .shape
        .static_dims()
        .ok_or_else(|| BackendError::execution("expected static shape"))
}

impl HostExecutor for ToyExecutor {
    fn execute(&self, node: &Node, inputs: &[TensorLiteral]) -> BackendResult<Vec<TensorLiteral>> {
        match &node.op {
            Operation::Unary(op) => {
                let x = values(&inputs[0])?;
                let out: Vec<f32> = x.iter().map(|v| Self::unary(*op, *v)).collect();
                Ok(vec![tensor_literal_f32(&dims(&inputs[0])?, &out)])
            }
            Operation::Binary(op) => {
                let a = values(&inputs[0])?;
                let b = values(&inputs[1])?;
                if a.len() != b.len() {
                    return Err(BackendError::arity("binary operands", a.len(), b.len()));
                }
                let out: Vec<f32> = a
                    .iter()
                    .zip(&b)
                    .map(|(x, y)| Self::binary(*op, *x, *y))
                    .collect();
                Ok(vec![tensor_literal_f32(&dims(&inputs[0])?, &out)])
            }
            Operation::Split(spec) if spec.axis == 0 => {
                let x = values(&inputs[0])?;
                let mut offset = 0;
                let mut outputs = Vec::with_capacity(spec.sizes.len());
                for size in &spec.sizes {
                    outputs.push(tensor_literal_f32(&[*size], &x[offset..offset + size]));
                    offset += size;
                }
                Ok(outputs)
            }
            Operation::Custom(spec) if spec.target == "scale" => {
                let factor = match spec.attrs.get("factor") {
                    Some(CustomAttr::F64(factor)) => *factor as f32,
                    _ => 1.0,
                };
                let x = values(&inputs[0])?;
                let out: Vec<f32> = x.iter().map(|v| v * factor).collect();
                Ok(vec![tensor_literal_f32(&dims(&inputs[0])?, &out)])
            }
            other => Err(BackendError::unimplemented(
                format!("{:?}", other.kind()),
                "toy executor",
            )),
        }
    }
}

/// Interpreter converter that records every conversion.
pub struct CountingConverter {
    inner: InterpreterConverter<ToyExecutor>,
    calls: AtomicUsize,
    hints: std::sync::Mutex<Vec<ShapeHints>>,
}

impl CountingConverter {
    pub fn new() -> Self {
        Self {
            inner: InterpreterConverter::new(ToyExecutor),
            calls: AtomicUsize::new(0),
            hints: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_hints(&self) -> Vec<ShapeHints> {
        self.hints.lock().expect("hints lock").clone()
    }
}

impl SubgraphConverter for CountingConverter {
    fn name(&self) -> &str {
        "counting"
    }

    fn convert(&self, graph: &Graph, hints: &ShapeHints) -> ConversionResult<EngineHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hints.lock().expect("hints lock").push(hints.clone());
        self.inner.convert(graph, hints)
    }
}

/// Converter that always refuses.
pub struct FailingConverter;

impl SubgraphConverter for FailingConverter {
    fn name(&self) -> &str {
        "failing"
    }

    fn convert(&self, _graph: &Graph, _hints: &ShapeHints) -> ConversionResult<EngineHandle> {
        Err(ConversionError::new("unsupported shape"))
    }
}

/// Engine with fixed slot metadata that echoes its inputs.
#[derive(Debug)]
pub struct FixedEngine {
    pub name: String,
    pub inputs: Vec<SlotDesc>,
    pub outputs: Vec<SlotDesc>,
}

impl FixedEngine {
    pub fn new(inputs: usize, outputs: usize, dims: &[usize]) -> Self {
        Self {
            name: format!("fixed_{inputs}x{outputs}"),
            inputs: (0..inputs)
                .map(|i| SlotDesc::input(i, f32_tensor(dims)))
                .collect(),
            outputs: (0..outputs)
                .map(|i| SlotDesc::output(i, f32_tensor(dims)))
                .collect(),
        }
    }
}

impl EngineInstance for FixedEngine {
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
        let first = inputs
            .first()
            .cloned()
            .ok_or_else(|| BackendError::execution("no inputs"))?;
        Ok((0..self.outputs.len())
            .map(|i| inputs.get(i).cloned().unwrap_or_else(|| first.clone()))
            .collect())
    }
}

/// Converter that ignores the graph and returns a prebuilt engine.
pub struct FixedConverter {
    pub engine: EngineHandle,
}

impl FixedConverter {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            engine: Arc::new(FixedEngine::new(inputs, outputs, &[2])),
        }
    }
}

impl SubgraphConverter for FixedConverter {
    fn name(&self) -> &str {
        "fixed"
    }

    fn convert(&self, _graph: &Graph, _hints: &ShapeHints) -> ConversionResult<EngineHandle> {
        Ok(Arc::clone(&self.engine))
    }
}

impl fmt::Debug for CountingConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingConverter")
            .field("calls", &self.calls())
            .finish()
    }
}

pub fn scale_op(factor: f64) -> Operation {
    let mut attrs = BTreeMap::new();
    attrs.insert("factor".to_string(), CustomAttr::F64(factor));
    Operation::Custom(CustomSpec {
        target: "scale".to_string(),
        outputs: 1,
        attrs,
    })
}

pub fn split_op(sizes: &[usize]) -> Operation {
    Operation::Split(SplitSpec {
        axis: 0,
        sizes: sizes.to_vec(),
    })
}

/// `x -> relu -> scale(2) -> y`, the relu being engine-eligible and the scale host-only.
pub struct Chain {
    pub graph: Graph,
    pub x: ValueId,
    pub a: ValueId,
    pub y: ValueId,
}

pub fn chain() -> Chain {
    let mut graph = Graph::new();
    let x = graph.add_named_input("x", f32_tensor(&[2]));
    let a = graph
        .append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_tensor(&[2]))
        .expect("relu");
    let y = graph
        .append_single(scale_op(2.0), vec![a], f32_tensor(&[2]))
        .expect("scale");
    graph.register_output(y).expect("output");
    Chain { graph, x, a, y }
}

/// Two independent branches `relu(x1)` and `neg(x2)` joined by an add.
pub struct Diamond {
    pub graph: Graph,
    pub x1: ValueId,
    pub x2: ValueId,
    pub a1: ValueId,
    pub a2: ValueId,
    pub sum: ValueId,
}

pub fn diamond() -> Diamond {
    let mut graph = Graph::new();
    let x1 = graph.add_named_input("x1", f32_tensor(&[2]));
    let x2 = graph.add_named_input("x2", f32_tensor(&[2]));
    let a1 = graph
        .append_single(Operation::Unary(UnaryOp::Relu), vec![x1], f32_tensor(&[2]))
        .expect("relu");
    let a2 = graph
        .append_single(Operation::Unary(UnaryOp::Neg), vec![x2], f32_tensor(&[2]))
        .expect("neg");
    let sum = graph
        .append_single(Operation::Binary(BinaryOp::Add), vec![a1, a2], f32_tensor(&[2]))
        .expect("add");
    graph.register_output(sum).expect("output");
    Diamond {
        graph,
        x1,
        x2,
        a1,
        a2,
        sum,
    }
}

pub fn f32_input(values: &[f32]) -> TensorLiteral {
    tensor_literal_f32(&[values.len()], values)
}

pub fn tensor_values(value: &RuntimeValue) -> Vec<f32> {
    value
        .as_tensor()
        .and_then(literal_f32_values)
        .expect("f32 tensor value")
}

/// Runs `graph` directly on the host executor.
pub fn run_reference(graph: &Graph, inputs: &[TensorLiteral]) -> Vec<RuntimeValue> {
    hetero_rs::runtime::execute_graph(
        graph,
        &hetero_rs::engine::EngineTable::new(),
        &ToyExecutor,
        inputs.iter().cloned().map(RuntimeValue::Tensor).collect(),
    )
    .expect("reference execution")
}
