//! Finished, callable output of a compilation pass.

use std::fmt;

use crate::engine::{EngineHandle, EngineKey, EngineTable};
use crate::graph::{Graph, TensorLiteral, ValueType};
use crate::runtime::{execute_graph, BackendResult, HostExecutor, RuntimeValue};

/// Typed calling convention of a unit's entry graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub inputs: Vec<(String, ValueType)>,
    pub outputs: Vec<ValueType>,
}

impl Signature {
    /// Derives the signature of `graph`; unnamed inputs are called `input_{i}`.
    pub fn of_graph(name: impl Into<String>, graph: &Graph) -> Self {
        let inputs = graph
            .inputs()
            .iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let info = graph.value(*value).ok()?;
                let name = info
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("input_{index}"));
                Some((name, info.ty.clone()))
            })
            .collect();
        let outputs = graph
            .outputs()
            .iter()
            .filter_map(|value| graph.value_type(*value).ok().cloned())
            .collect();
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (position, (name, ty)) in self.inputs.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty} {name}")?;
        }
        f.write_str(") -> (")?;
        for (position, ty) in self.outputs.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

/// Rewritten entry graph together with the engines it calls.
///
/// Immutable once built: `run` takes `&self`, so a unit can be shared across threads and
/// invoked concurrently.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    name: String,
    entry: Graph,
    engines: EngineTable,
    signature: Signature,
}

impl CompiledUnit {
    pub fn new(
        name: impl Into<String>,
        entry_name: impl Into<String>,
        entry: Graph,
        engines: EngineTable,
    ) -> Self {
        let signature = Signature::of_graph(entry_name, &entry);
        Self {
            name: name.into(),
            entry,
            engines,
            signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_name(&self) -> &str {
        &self.signature.name
    }

    pub fn entry(&self) -> &Graph {
        &self.entry
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn engines(&self) -> &EngineTable {
        &self.engines
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Attribute names of the registered engines, in key order.
    pub fn engine_names(&self) -> Vec<String> {
        self.engines.keys().map(EngineKey::to_string).collect()
    }

    pub fn engine(&self, name: &str) -> Option<&EngineHandle> {
        self.engines.find(name).map(|(_, engine)| engine)
    }

    /// Evaluates the entry graph on `inputs`.
    pub fn run(
        &self,
        executor: &dyn HostExecutor,
        inputs: Vec<TensorLiteral>,
    ) -> BackendResult<Vec<RuntimeValue>> {
        execute_graph(
            &self.entry,
            &self.engines,
            executor,
            inputs.into_iter().map(RuntimeValue::Tensor).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::utils::f32_tensor;

    #[test]
    fn signature_renders_schema() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_tensor(&[1, 3]));
        let w = graph.add_named_input("weight", f32_tensor(&[3]));
        graph.register_output(x).unwrap();
        graph.register_output(w).unwrap();
        let signature = Signature::of_graph("forward", &graph);
        assert_eq!(
            signature.to_string(),
            concat!(
                "forward(tensor<F32 x 1x3> input_0, tensor<F32 x 3> weight) ",
                "-> (tensor<F32 x 1x3>, tensor<F32 x 3>)"
            )
        );
    }
}
