use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::EngineKey;
use crate::graph::types::{DType, TensorLiteral};

/// Elementwise unary host operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Tanh,
    Relu,
    Sigmoid,
    Sqrt,
}

/// Elementwise binary host operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

/// Attribute payload for `reshape`; `-1` marks the inferred axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReshapeSpec {
    pub dims: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcatSpec {
    pub axis: usize,
}

/// Attribute payload for `split`; produces one output per entry in `sizes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitSpec {
    pub axis: usize,
    pub sizes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastSpec {
    pub dtype: DType,
}

/// Custom operator attributes are limited to primitives and arrays so they stay easy to
/// serialize and hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CustomAttr {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
}

/// Named host operator not covered by the built-in kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSpec {
    pub target: String,
    pub outputs: usize,
    #[serde(default)]
    pub attrs: BTreeMap<String, CustomAttr>,
}

/// Closed set of operator kinds carried by graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Constant(TensorLiteral),
    Unary(UnaryOp),
    Binary(BinaryOp),
    MatMul,
    Reshape(ReshapeSpec),
    Transpose(TransposeSpec),
    Concat(ConcatSpec),
    Split(SplitSpec),
    Cast(CastSpec),
    Custom(CustomSpec),
    /// Reads an engine attribute from the enclosing compiled unit.
    GetAttr {
        key: EngineKey,
    },
    ListConstruct,
    ListUnpack {
        count: usize,
    },
    TupleConstruct,
    /// Runs an engine: operands are `(input_list, engine)`, result is a list.
    ExecuteEngine,
}

/// Field-less tag of an [`Operation`], used by placement predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Constant,
    Unary,
    Binary,
    MatMul,
    Reshape,
    Transpose,
    Concat,
    Split,
    Cast,
    Custom,
    GetAttr,
    ListConstruct,
    ListUnpack,
    TupleConstruct,
    ExecuteEngine,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Constant(_) => OperationKind::Constant,
            Operation::Unary(_) => OperationKind::Unary,
            Operation::Binary(_) => OperationKind::Binary,
            Operation::MatMul => OperationKind::MatMul,
            Operation::Reshape(_) => OperationKind::Reshape,
            Operation::Transpose(_) => OperationKind::Transpose,
            Operation::Concat(_) => OperationKind::Concat,
            Operation::Split(_) => OperationKind::Split,
            Operation::Cast(_) => OperationKind::Cast,
            Operation::Custom(_) => OperationKind::Custom,
            Operation::GetAttr { .. } => OperationKind::GetAttr,
            Operation::ListConstruct => OperationKind::ListConstruct,
            Operation::ListUnpack { .. } => OperationKind::ListUnpack,
            Operation::TupleConstruct => OperationKind::TupleConstruct,
            Operation::ExecuteEngine => OperationKind::ExecuteEngine,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operation::Constant(_))
    }

    /// Returns `true` for the packing and engine-call operators emitted by the rewrite.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Operation::GetAttr { .. }
                | Operation::ListConstruct
                | Operation::ListUnpack { .. }
                | Operation::TupleConstruct
                | Operation::ExecuteEngine
        )
    }

    /// Number of operands the operation accepts, `None` when variadic.
    pub fn expected_inputs(&self) -> Option<usize> {
        match self {
            Operation::Constant(_) | Operation::GetAttr { .. } => Some(0),
            Operation::Unary(_)
            | Operation::Reshape(_)
            | Operation::Transpose(_)
            | Operation::Split(_)
            | Operation::Cast(_)
            | Operation::ListUnpack { .. } => Some(1),
            Operation::Binary(_) | Operation::MatMul | Operation::ExecuteEngine => Some(2),
            Operation::Concat(_)
            | Operation::Custom(_)
            | Operation::ListConstruct
            | Operation::TupleConstruct => None,
        }
    }

    /// Number of results the operation produces.
    pub fn expected_outputs(&self) -> usize {
        match self {
            Operation::Split(spec) => spec.sizes.len(),
            Operation::Custom(spec) => spec.outputs,
            Operation::ListUnpack { count } => *count,
            _ => 1,
        }
    }
}
