use std::{fmt, sync::Arc};

use serde::{ser::SerializeStruct, Deserialize, Serialize};

/// Enumerates scalar element types carried by host graph values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si32,
    Si64,
    Bf16,
    F16,
    F32,
    F64,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I1 | DType::Si8 | DType::Ui8 => 1,
            DType::Bf16 | DType::F16 => 2,
            DType::Si32 | DType::F32 => 4,
            DType::Si64 | DType::F64 => 8,
        }
    }
}

/// Names a symbolic dynamic dimension (e.g. `?B`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Returns static dimensions when all dims are static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            match dim {
                Dimension::Static(value) => dims.push(*value),
                Dimension::Dynamic(_) => return None,
            }
        }
        Some(dims)
    }

    /// Returns element count when all dims are static.
    pub fn element_count(&self) -> Option<usize> {
        let dims = self.static_dims()?;
        let mut count = 1usize;
        for dim in dims {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                f.write_str("x")?;
            }
            match dim {
                Dimension::Static(v) => write!(f, "{v}")?,
                Dimension::Dynamic(sym) => write!(f, "?{}", sym.as_str())?,
            }
        }
        Ok(())
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// Returns total byte length when the shape is static.
    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .element_count()?
            .checked_mul(self.dtype.size_in_bytes())
    }
}

/// Dense literal tensor payload embedded in constant nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("spec", &self.spec)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            spec: TensorSpec,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            spec: helper.spec,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

/// Typing information for graph values.
///
/// Lists record their element types positionally so that unpacking an engine result recovers
/// the per-slot tensor types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Tensor(TensorSpec),
    List(Vec<ValueType>),
    Tuple(Vec<ValueType>),
    Engine,
}

impl ValueType {
    pub fn as_tensor(&self) -> Option<&TensorSpec> {
        match self {
            ValueType::Tensor(spec) => Some(spec),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor(spec) => write!(f, "tensor<{:?} x {}>", spec.dtype, spec.shape),
            ValueType::List(elements) => {
                f.write_str("list<")?;
                write_joined(f, elements)?;
                f.write_str(">")
            }
            ValueType::Tuple(elements) => {
                f.write_str("tuple<")?;
                write_joined(f, elements)?;
                f.write_str(">")
            }
            ValueType::Engine => f.write_str("engine"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, elements: &[ValueType]) -> fmt::Result {
    for (idx, element) in elements.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{element}")?;
    }
    Ok(())
}
