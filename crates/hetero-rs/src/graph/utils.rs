use std::sync::Arc;

use crate::graph::{DType, DimSymbol, Dimension, Shape, TensorLiteral, TensorSpec, ValueType};

/// Builds a static shape descriptor from explicit dimensions.
pub fn shape_static(dims: &[usize]) -> Shape {
    Shape::new(
        dims.iter()
            .copied()
            .map(Dimension::Static)
            .collect::<Vec<_>>(),
    )
}

/// Builds a mixed static/dynamic shape descriptor.
pub fn shape_mixed(dims: &[Option<usize>]) -> Shape {
    Shape::new(
        dims.iter()
            .enumerate()
            .map(|(idx, dim)| match dim {
                Some(value) => Dimension::Static(*value),
                None => Dimension::Dynamic(DimSymbol::new(format!("d{idx}"))),
            })
            .collect::<Vec<_>>(),
    )
}

pub fn tensor_spec_static(dtype: DType, dims: &[usize]) -> TensorSpec {
    TensorSpec::new(dtype, shape_static(dims))
}

pub fn tensor_spec_mixed(dtype: DType, dims: &[Option<usize>]) -> TensorSpec {
    TensorSpec::new(dtype, shape_mixed(dims))
}

pub fn value_type_tensor(spec: TensorSpec) -> ValueType {
    ValueType::Tensor(spec)
}

/// Shorthand for a static f32 tensor type.
pub fn f32_tensor(dims: &[usize]) -> ValueType {
    value_type_tensor(tensor_spec_static(DType::F32, dims))
}

/// Packs little-endian f32 values into a literal of the given static shape.
pub fn tensor_literal_f32(dims: &[usize], values: &[f32]) -> TensorLiteral {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    TensorLiteral::new(
        tensor_spec_static(DType::F32, dims),
        Arc::<[u8]>::from(bytes),
    )
}

/// Decodes an f32 literal; `None` for other dtypes.
pub fn literal_f32_values(literal: &TensorLiteral) -> Option<Vec<f32>> {
    if literal.spec.dtype != DType::F32 || literal.bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        literal
            .bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
