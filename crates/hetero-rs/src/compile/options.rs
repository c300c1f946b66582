use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compile::error::CompileError;
use crate::graph::{Graph, Producer, ValueId, ValueType};

/// Inclusive range of input shapes an engine must accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRange {
    pub min: Vec<usize>,
    pub max: Vec<usize>,
}

impl ShapeRange {
    pub fn new(min: Vec<usize>, max: Vec<usize>) -> Self {
        Self { min, max }
    }

    pub fn fixed(dims: Vec<usize>) -> Self {
        Self {
            min: dims.clone(),
            max: dims,
        }
    }

    pub fn rank(&self) -> usize {
        self.min.len()
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    fn check(&self) -> Result<(), String> {
        if self.min.len() != self.max.len() {
            return Err(format!(
                "min rank {} does not match max rank {}",
                self.min.len(),
                self.max.len()
            ));
        }
        if let Some(axis) = self
            .min
            .iter()
            .zip(&self.max)
            .position(|(lo, hi)| lo > hi)
        {
            return Err(format!(
                "axis {axis}: min {} exceeds max {}",
                self.min[axis], self.max[axis]
            ));
        }
        Ok(())
    }
}

/// Input shape hints keyed by input name (`input_{i}` or the input's debug name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeHints {
    ranges: BTreeMap<String, ShapeRange>,
}

impl ShapeHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, range: ShapeRange) -> Option<ShapeRange> {
        self.ranges.insert(name.into(), range)
    }

    pub fn with(mut self, name: impl Into<String>, range: ShapeRange) -> Self {
        self.insert(name, range);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ShapeRange> {
        self.ranges.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShapeRange)> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Rejects malformed ranges and keys that name no input of `graph`.
    pub fn validate_against(&self, graph: &Graph) -> Result<(), CompileError> {
        for (name, range) in &self.ranges {
            range
                .check()
                .map_err(|detail| CompileError::InvalidShapeHint {
                    name: name.clone(),
                    detail,
                })?;
            let Some(input) = find_input(graph, name) else {
                return Err(CompileError::InvalidShapeHint {
                    name: name.clone(),
                    detail: "no graph input carries this name".to_string(),
                });
            };
            if let Ok(ValueType::Tensor(spec)) = graph.value_type(input) {
                if spec.shape.rank() != range.rank() {
                    return Err(CompileError::InvalidShapeHint {
                        name: name.clone(),
                        detail: format!(
                            "rank {} does not match input rank {}",
                            range.rank(),
                            spec.shape.rank()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Derives hints for a segment's local graph, keyed by local slot position.
    ///
    /// A raw input that is graph input `i` inherits the hint given for that input; otherwise a
    /// fully static tensor type yields a fixed hint.
    pub fn for_segment(&self, graph: &Graph, raw_inputs: &[ValueId]) -> ShapeHints {
        let mut local = ShapeHints::new();
        for (slot, value) in raw_inputs.iter().enumerate() {
            let Ok(info) = graph.value(*value) else {
                continue;
            };
            let inherited = match info.producer {
                Producer::Input { index } => self
                    .get(&format!("input_{index}"))
                    .or_else(|| info.name.as_deref().and_then(|name| self.get(name))),
                Producer::Node { .. } => None,
            };
            let range = match inherited {
                Some(range) => Some(range.clone()),
                None => info
                    .ty
                    .as_tensor()
                    .and_then(|spec| spec.shape.static_dims())
                    .map(ShapeRange::fixed),
            };
            if let Some(range) = range {
                local.insert(format!("input_{slot}"), range);
            }
        }
        local
    }
}

fn find_input(graph: &Graph, name: &str) -> Option<ValueId> {
    if let Some(index) = name.strip_prefix("input_") {
        if let Ok(index) = index.parse::<usize>() {
            if let Some(value) = graph.inputs().get(index) {
                return Some(*value);
            }
        }
    }
    graph.inputs().iter().copied().find(|value| {
        graph
            .value(*value)
            .map(|info| info.name.as_deref() == Some(name))
            .unwrap_or(false)
    })
}

fn default_unit_name() -> String {
    "hetero".to_string()
}

fn default_entry_name() -> String {
    "forward".to_string()
}

fn default_engine_prefix() -> String {
    "engine".to_string()
}

fn default_validate_output() -> bool {
    true
}

/// Knobs for one compilation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    #[serde(default = "default_unit_name")]
    pub unit_name: String,
    #[serde(default = "default_entry_name")]
    pub entry_name: String,
    #[serde(default = "default_engine_prefix")]
    pub engine_prefix: String,
    #[serde(default)]
    pub shape_hints: ShapeHints,
    #[serde(default = "default_validate_output")]
    pub validate_output: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            unit_name: default_unit_name(),
            entry_name: default_entry_name(),
            engine_prefix: default_engine_prefix(),
            shape_hints: ShapeHints::default(),
            validate_output: default_validate_output(),
        }
    }
}

impl CompileOptions {
    pub fn with_unit_name(mut self, name: impl Into<String>) -> Self {
        self.unit_name = name.into();
        self
    }

    pub fn with_shape_hints(mut self, hints: ShapeHints) -> Self {
        self.shape_hints = hints;
        self
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }

    /// Returns whether the rewritten graph should be re-validated, honouring `HETERO_VALIDATE`.
    pub(crate) fn should_validate(&self) -> bool {
        crate::env::validate_override().unwrap_or(self.validate_output)
    }
}
