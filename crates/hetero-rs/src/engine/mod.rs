//! Engine boundary: precompiled artifacts bound to native-engine segments and the converters
//! that produce them.

mod interpreter;
mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compile::options::ShapeHints;
use crate::graph::{Graph, TensorLiteral, ValueType};
use crate::runtime::BackendResult;

pub use interpreter::{InterpretedEngine, InterpreterConverter};
pub use registry::{
    get_converter, list_converters, register_converter, unregister_converter,
};

/// Named, typed engine input or output slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDesc {
    pub name: String,
    pub ty: ValueType,
}

impl SlotDesc {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn input(index: usize, ty: ValueType) -> Self {
        Self::new(format!("input_{index}"), ty)
    }

    pub fn output(index: usize, ty: ValueType) -> Self {
        Self::new(format!("output_{index}"), ty)
    }
}

/// Opaque compiled artifact for one native-engine segment.
///
/// Slot order is the calling convention: `forward` receives tensors in `input_slots` order and
/// must return them in `output_slots` order. Implementations must tolerate concurrent `forward`
/// calls with independent buffers.
pub trait EngineInstance: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn input_slots(&self) -> &[SlotDesc];

    fn output_slots(&self) -> &[SlotDesc];

    fn forward(&self, inputs: &[TensorLiteral]) -> BackendResult<Vec<TensorLiteral>>;
}

pub type EngineHandle = Arc<dyn EngineInstance>;

/// Unique attribute key of an engine inside a compiled unit.
///
/// The ordinal is assigned monotonically per compilation and the digest hashes the engine's
/// local graph, so keys are unique without relying on string formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineKey {
    pub prefix: String,
    pub ordinal: u32,
    pub digest: u64,
}

impl EngineKey {
    pub fn new(prefix: impl Into<String>, ordinal: u32, digest: u64) -> Self {
        Self {
            prefix: prefix.into(),
            ordinal,
            digest,
        }
    }
}

impl fmt::Display for EngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{:016x}", self.prefix, self.ordinal, self.digest)
    }
}

/// Engines registered as attributes of a compiled unit.
#[derive(Debug, Clone, Default)]
pub struct EngineTable {
    entries: BTreeMap<EngineKey, EngineHandle>,
}

impl EngineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `engine` under `key`; returns the key back when it is already taken.
    pub fn register(&mut self, key: EngineKey, engine: EngineHandle) -> Result<(), EngineKey> {
        if self.entries.contains_key(&key) {
            return Err(key);
        }
        self.entries.insert(key, engine);
        Ok(())
    }

    pub fn get(&self, key: &EngineKey) -> Option<&EngineHandle> {
        self.entries.get(key)
    }

    /// Looks an engine up by its rendered attribute name.
    pub fn find(&self, name: &str) -> Option<(&EngineKey, &EngineHandle)> {
        self.entries.iter().find(|(key, _)| key.to_string() == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &EngineKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EngineKey, &EngineHandle)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Turns a segment's local graph into an engine.
///
/// The returned engine must expose exactly one input slot per graph input and one output slot
/// per graph output, in the same order.
pub trait SubgraphConverter: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u64 {
        0
    }

    fn convert(&self, graph: &Graph, hints: &ShapeHints) -> ConversionResult<EngineHandle>;
}
