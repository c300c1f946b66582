//! Owned host dataflow graph.
//!
//! Values and nodes live in append-only arenas addressed by dense ids. A node can only consume
//! values that already exist when it is appended, so program order is always a valid
//! topological order. Graphs never share values: moving data across graphs goes through
//! [`crate::compile::remap::ValueRemapper`].

mod ops;
mod topology;
mod types;
pub mod utils;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::engine::EngineKey;

pub use ops::{
    BinaryOp, CastSpec, ConcatSpec, CustomAttr, CustomSpec, Operation, OperationKind, ReshapeSpec,
    SplitSpec, TransposeSpec, UnaryOp,
};
pub use topology::TopologyError;
pub use types::{DType, DimSymbol, Dimension, Shape, TensorLiteral, TensorSpec, ValueType};

/// Identity of a value inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Identity of a node inside one graph; equal to its position in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Producer {
    Input { index: u32 },
    Node { node: NodeId, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub ty: ValueType,
    pub producer: Producer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Single operation instance with ordered operands and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub op: Operation,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

impl Node {
    /// Returns the sole output of a single-result node.
    pub fn output(&self) -> Option<ValueId> {
        match self.outputs.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("value {value} does not exist in this graph")]
    UnknownValue { value: ValueId },
    #[error("node {node} does not exist in this graph")]
    UnknownNode { node: NodeId },
    #[error("{op:?} expects {expected} operands, got {found}")]
    InputArity {
        op: OperationKind,
        expected: usize,
        found: usize,
    },
    #[error("{op:?} produces {expected} results, got {found} result types")]
    OutputArity {
        op: OperationKind,
        expected: usize,
        found: usize,
    },
    #[error("value {value} has type {found}, expected {expected}")]
    TypeMismatch {
        value: ValueId,
        expected: &'static str,
        found: ValueType,
    },
}

/// Ordered dataflow graph with designated inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    values: Vec<ValueInfo>,
    nodes: Vec<Node>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn contains_value(&self, value: ValueId) -> bool {
        (value.0 as usize) < self.values.len()
    }

    pub fn value(&self, value: ValueId) -> Result<&ValueInfo, GraphError> {
        self.values
            .get(value.0 as usize)
            .ok_or(GraphError::UnknownValue { value })
    }

    pub fn value_type(&self, value: ValueId) -> Result<&ValueType, GraphError> {
        self.value(value).map(|info| &info.ty)
    }

    pub fn producer(&self, value: ValueId) -> Result<Producer, GraphError> {
        self.value(value).map(|info| info.producer)
    }

    pub fn node(&self, node: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(node.0 as usize)
            .ok_or(GraphError::UnknownNode { node })
    }

    /// Returns the node producing `value`, or `None` for graph inputs.
    pub fn producing_node(&self, value: ValueId) -> Result<Option<&Node>, GraphError> {
        match self.producer(value)? {
            Producer::Input { .. } => Ok(None),
            Producer::Node { node, .. } => self.node(node).map(Some),
        }
    }

    /// Returns the literal when `value` is produced by a constant node.
    pub fn constant_literal(&self, value: ValueId) -> Result<Option<&TensorLiteral>, GraphError> {
        Ok(match self.producing_node(value)? {
            Some(Node {
                op: Operation::Constant(literal),
                ..
            }) => Some(literal),
            _ => None,
        })
    }

    /// Returns the consumers of `value` in program order.
    pub fn users_of(&self, value: ValueId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.inputs.contains(&value))
            .map(|node| node.id)
            .collect()
    }

    /// Builds the consumer lists of every value in a single sweep.
    ///
    /// Operands outside the value arena are skipped; `validate` reports them.
    pub fn users(&self) -> Vec<SmallVec<[NodeId; 4]>> {
        let mut users = vec![SmallVec::new(); self.values.len()];
        for node in &self.nodes {
            for input in &node.inputs {
                let Some(list) = users.get_mut(input.0 as usize) else {
                    continue;
                };
                if list.last() != Some(&node.id) {
                    list.push(node.id);
                }
            }
        }
        users
    }

    /// Appends a new graph input.
    pub fn add_input(&mut self, ty: ValueType) -> ValueId {
        let index = self.inputs.len() as u32;
        let value = self.push_value(ty, Producer::Input { index }, None);
        self.inputs.push(value);
        value
    }

    pub fn add_named_input(&mut self, name: impl Into<String>, ty: ValueType) -> ValueId {
        let value = self.add_input(ty);
        self.values[value.0 as usize].name = Some(name.into());
        value
    }

    /// Copies type and debug name of a value from another graph onto `value`.
    pub fn copy_metadata(&mut self, value: ValueId, from: &ValueInfo) -> Result<(), GraphError> {
        let info = self
            .values
            .get_mut(value.0 as usize)
            .ok_or(GraphError::UnknownValue { value })?;
        info.ty = from.ty.clone();
        info.name = from.name.clone();
        Ok(())
    }

    pub fn set_value_name(
        &mut self,
        value: ValueId,
        name: Option<String>,
    ) -> Result<(), GraphError> {
        let info = self
            .values
            .get_mut(value.0 as usize)
            .ok_or(GraphError::UnknownValue { value })?;
        info.name = name;
        Ok(())
    }

    /// Appends a node at the end of the program, allocating one value per result type.
    pub fn append_node(
        &mut self,
        op: Operation,
        inputs: Vec<ValueId>,
        output_types: Vec<ValueType>,
    ) -> Result<NodeId, GraphError> {
        if let Some(expected) = op.expected_inputs() {
            if expected != inputs.len() {
                return Err(GraphError::InputArity {
                    op: op.kind(),
                    expected,
                    found: inputs.len(),
                });
            }
        }
        if op.expected_outputs() != output_types.len() {
            return Err(GraphError::OutputArity {
                op: op.kind(),
                expected: op.expected_outputs(),
                found: output_types.len(),
            });
        }
        for input in &inputs {
            if !self.contains_value(*input) {
                return Err(GraphError::UnknownValue { value: *input });
            }
        }

        let id = NodeId(self.nodes.len() as u32);
        let outputs = output_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.push_value(
                    ty,
                    Producer::Node {
                        node: id,
                        index: index as u32,
                    },
                    None,
                )
            })
            .collect();
        self.nodes.push(Node {
            id,
            op,
            inputs,
            outputs,
        });
        Ok(id)
    }

    /// Appends a single-result node and returns its value.
    pub fn append_single(
        &mut self,
        op: Operation,
        inputs: Vec<ValueId>,
        output: ValueType,
    ) -> Result<ValueId, GraphError> {
        let node = self.append_node(op, inputs, vec![output])?;
        Ok(self.nodes[node.0 as usize].outputs[0])
    }

    pub fn register_output(&mut self, value: ValueId) -> Result<(), GraphError> {
        if !self.contains_value(value) {
            return Err(GraphError::UnknownValue { value });
        }
        self.outputs.push(value);
        Ok(())
    }

    /// Emits `GetAttr` yielding the engine registered under `key`.
    pub fn create_get_attr(&mut self, key: EngineKey) -> Result<ValueId, GraphError> {
        self.append_single(Operation::GetAttr { key }, Vec::new(), ValueType::Engine)
    }

    /// Emits `ListConstruct` packing `items` into one ordered list value.
    pub fn create_list(&mut self, items: Vec<ValueId>) -> Result<ValueId, GraphError> {
        let element_types = self.types_of(&items)?;
        self.append_single(
            Operation::ListConstruct,
            items,
            ValueType::List(element_types),
        )
    }

    /// Emits `ExecuteEngine(list, engine)` producing a list typed after `output_types`.
    pub fn create_execute_engine(
        &mut self,
        list: ValueId,
        engine: ValueId,
        output_types: Vec<ValueType>,
    ) -> Result<ValueId, GraphError> {
        self.expect_type(list, "list", |ty| matches!(ty, ValueType::List(_)))?;
        self.expect_type(engine, "engine", |ty| matches!(ty, ValueType::Engine))?;
        self.append_single(
            Operation::ExecuteEngine,
            vec![list, engine],
            ValueType::List(output_types),
        )
    }

    /// Emits `ListUnpack` splitting `list` into exactly `count` values.
    pub fn create_list_unpack(
        &mut self,
        list: ValueId,
        count: usize,
    ) -> Result<Vec<ValueId>, GraphError> {
        let element_types = match self.value_type(list)? {
            ValueType::List(elements) if elements.len() == count => elements.clone(),
            other => {
                return Err(GraphError::TypeMismatch {
                    value: list,
                    expected: "list with matching element count",
                    found: other.clone(),
                })
            }
        };
        let node = self.append_node(Operation::ListUnpack { count }, vec![list], element_types)?;
        Ok(self.nodes[node.0 as usize].outputs.clone())
    }

    /// Emits `TupleConstruct` over `items`.
    pub fn create_tuple(&mut self, items: Vec<ValueId>) -> Result<ValueId, GraphError> {
        let element_types = self.types_of(&items)?;
        self.append_single(
            Operation::TupleConstruct,
            items,
            ValueType::Tuple(element_types),
        )
    }

    fn types_of(&self, values: &[ValueId]) -> Result<Vec<ValueType>, GraphError> {
        values
            .iter()
            .map(|value| self.value_type(*value).cloned())
            .collect()
    }

    fn expect_type(
        &self,
        value: ValueId,
        expected: &'static str,
        check: impl Fn(&ValueType) -> bool,
    ) -> Result<(), GraphError> {
        let ty = self.value_type(value)?;
        if check(ty) {
            Ok(())
        } else {
            Err(GraphError::TypeMismatch {
                value,
                expected,
                found: ty.clone(),
            })
        }
    }

    fn push_value(&mut self, ty: ValueType, producer: Producer, name: Option<String>) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo { ty, producer, name });
        id
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, 0, "graph {")?;
        if !self.inputs.is_empty() {
            write_line(f, 1, "params:")?;
            for input in &self.inputs {
                write_line(f, 2, &self.format_binding(*input))?;
            }
        }
        if !self.nodes.is_empty() {
            write_line(f, 1, "body:")?;
            for node in &self.nodes {
                write_line(f, 2, &self.format_node(node))?;
            }
        }
        if !self.outputs.is_empty() {
            write_line(f, 1, "results:")?;
            for output in &self.outputs {
                write_line(f, 2, &self.format_binding(*output))?;
            }
        }
        write_line(f, 0, "}")
    }
}

impl Graph {
    fn format_binding(&self, value: ValueId) -> String {
        match self.value(value) {
            Ok(info) => match &info.name {
                Some(name) => format!("{value} ({name}) : {}", info.ty),
                None => format!("{value} : {}", info.ty),
            },
            Err(_) => format!("{value} : <unknown>"),
        }
    }

    fn format_node(&self, node: &Node) -> String {
        let results = join_values(&node.outputs);
        let op_repr = match &node.op {
            Operation::Constant(literal) => format!(
                "Constant(dtype={:?}, shape={})",
                literal.spec.dtype, literal.spec.shape
            ),
            Operation::GetAttr { key } => format!("GetAttr({key})"),
            other => format!("{other:?}"),
        };
        let types = node
            .outputs
            .iter()
            .map(|value| match self.value_type(*value) {
                Ok(ty) => ty.to_string(),
                Err(_) => "<unknown>".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let lhs = if results.is_empty() {
            String::new()
        } else {
            format!("{results} = ")
        };
        if node.inputs.is_empty() {
            format!("{lhs}{op_repr} -> ({types})")
        } else {
            format!(
                "{lhs}{op_repr}({}) -> ({types})",
                join_values(&node.inputs)
            )
        }
    }
}

fn join_values(values: &[ValueId]) -> String {
    values
        .iter()
        .map(ValueId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

#[cfg(test)]
mod tests {
    use super::utils::{tensor_spec_static, value_type_tensor};
    use super::*;

    fn f32_ty() -> ValueType {
        value_type_tensor(tensor_spec_static(DType::F32, &[2]))
    }

    #[test]
    fn append_node_rejects_unknown_operands() {
        let mut graph = Graph::new();
        let err = graph
            .append_node(Operation::Unary(UnaryOp::Neg), vec![ValueId(7)], vec![f32_ty()])
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownValue { value: ValueId(7) });
    }

    #[test]
    fn append_node_checks_result_arity() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_ty());
        let err = graph
            .append_node(
                Operation::Split(SplitSpec {
                    axis: 0,
                    sizes: vec![1, 1],
                }),
                vec![x],
                vec![f32_ty()],
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::OutputArity { expected: 2, found: 1, .. }));
    }

    #[test]
    fn users_are_recorded_once_per_node() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_ty());
        let sq = graph
            .append_single(Operation::Binary(BinaryOp::Mul), vec![x, x], f32_ty())
            .unwrap();
        let users = graph.users();
        assert_eq!(users[x.0 as usize].as_slice(), &[NodeId(0)]);
        assert!(users[sq.0 as usize].is_empty());
        assert_eq!(graph.users_of(x), vec![NodeId(0)]);
    }

    #[test]
    fn dangling_references_are_reported_not_indexed() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_ty());
        graph
            .append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_ty())
            .unwrap();
        graph.nodes[0].inputs[0] = ValueId(42);
        assert_eq!(graph.users().len(), graph.value_count());
        assert!(matches!(
            graph.validate(),
            Err(TopologyError::MissingOperand { value: ValueId(42), .. })
        ));

        graph.nodes[0].inputs[0] = x;
        graph.inputs.push(ValueId(7));
        assert_eq!(
            graph.validate(),
            Err(TopologyError::MissingInput { value: ValueId(7) })
        );
    }

    #[test]
    fn text_form_lists_params_body_and_results() {
        let mut graph = Graph::new();
        let x = graph.add_named_input("x", f32_ty());
        let y = graph
            .append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_ty())
            .unwrap();
        graph.register_output(y).unwrap();
        let text = graph.to_text();
        assert!(text.contains("params:\n    %0 (x) : tensor<F32 x 2>"));
        assert!(text.contains("%1 = Unary(Relu)(%0) -> (tensor<F32 x 2>)"));
        assert!(text.contains("results:\n    %1 : tensor<F32 x 2>"));
    }
}
