use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

use crate::compile::cloner::clone_node;
use crate::compile::error::{CompileError, CompileResult, ValueRole};
use crate::compile::remap::{RemapError, ValueRemapper};
use crate::graph::{Graph, NodeId, Producer, ValueId};

/// Execution domain of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentTarget {
    NativeEngine,
    HostFallback,
}

impl fmt::Display for SegmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentTarget::NativeEngine => f.write_str("native"),
            SegmentTarget::HostFallback => f.write_str("fallback"),
        }
    }
}

/// Contiguous, order-preserving run of nodes of an original graph.
///
/// `raw_inputs` are original values crossing into the run, `raw_outputs` are values it produces
/// for later consumers or for the graph's outputs. The optional local graph has inputs and
/// outputs positionally aligned with those lists.
#[derive(Debug, Clone)]
pub struct Segment {
    index: usize,
    target: SegmentTarget,
    nodes: Vec<NodeId>,
    raw_inputs: Vec<ValueId>,
    raw_outputs: Vec<ValueId>,
    local: Option<Graph>,
}

impl Segment {
    pub fn new(
        index: usize,
        target: SegmentTarget,
        nodes: Vec<NodeId>,
        raw_inputs: Vec<ValueId>,
        raw_outputs: Vec<ValueId>,
    ) -> Self {
        Self {
            index,
            target,
            nodes,
            raw_inputs,
            raw_outputs,
            local: None,
        }
    }

    /// Derives the boundary lists of `nodes` from `graph`.
    ///
    /// Constant literals never cross a boundary: consumers clone them locally instead.
    pub fn from_nodes(
        graph: &Graph,
        index: usize,
        target: SegmentTarget,
        nodes: Vec<NodeId>,
    ) -> CompileResult<Self> {
        let users = graph.users();
        Self::from_nodes_with_users(graph, &users, index, target, nodes)
    }

    pub(crate) fn from_nodes_with_users(
        graph: &Graph,
        users: &[SmallVec<[NodeId; 4]>],
        index: usize,
        target: SegmentTarget,
        nodes: Vec<NodeId>,
    ) -> CompileResult<Self> {
        let (Some(first), Some(last)) = (nodes.first().copied(), nodes.last().copied()) else {
            return Err(CompileError::PartitionContract {
                segment: index,
                detail: "segment has no nodes".to_string(),
            });
        };
        let inside = |node: NodeId| node >= first && node <= last;

        let mut raw_inputs = Vec::new();
        let mut raw_outputs = Vec::new();
        for id in &nodes {
            let node = graph.node(*id)?;
            for input in &node.inputs {
                if graph.constant_literal(*input)?.is_some() || raw_inputs.contains(input) {
                    continue;
                }
                let defined_inside = match graph.producer(*input)? {
                    Producer::Input { .. } => false,
                    Producer::Node { node, .. } => inside(node),
                };
                if !defined_inside {
                    raw_inputs.push(*input);
                }
            }
            if node.op.is_constant() {
                continue;
            }
            for output in &node.outputs {
                let escapes = users
                    .get(output.0 as usize)
                    .map(|list| list.iter().any(|user| !inside(*user)))
                    .unwrap_or(false);
                if escapes || graph.outputs().contains(output) {
                    raw_outputs.push(*output);
                }
            }
        }

        Ok(Self::new(index, target, nodes, raw_inputs, raw_outputs))
    }

    /// Attaches a prebuilt local graph.
    pub fn with_local_graph(mut self, local: Graph) -> CompileResult<Self> {
        self.check_local_arity(&local)?;
        self.local = Some(local);
        Ok(self)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> SegmentTarget {
        self.target
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn raw_inputs(&self) -> &[ValueId] {
        &self.raw_inputs
    }

    pub fn raw_outputs(&self) -> &[ValueId] {
        &self.raw_outputs
    }

    pub fn has_local_graph(&self) -> bool {
        self.local.is_some()
    }

    /// Returns the local graph, materializing it from `original` when none was attached.
    pub fn local_graph(&self, original: &Graph) -> CompileResult<Cow<'_, Graph>> {
        match &self.local {
            Some(local) => Ok(Cow::Borrowed(local)),
            None => self.build_local_graph(original).map(Cow::Owned),
        }
    }

    fn build_local_graph(&self, original: &Graph) -> CompileResult<Graph> {
        let mut local = Graph::new();
        let mut remapper = ValueRemapper::for_source(original);
        for raw in &self.raw_inputs {
            let info = original.value(*raw)?;
            let input = local.add_input(info.ty.clone());
            local.copy_metadata(input, info)?;
            remapper
                .insert(*raw, input)
                .map_err(|err| self.remap_error(err, ValueRole::RawInput))?;
        }
        remapper.seal();

        for node in &self.nodes {
            clone_node(original, *node, &mut local, &mut remapper)
                .map_err(|err| self.remap_error(err, ValueRole::NodeOperand))?;
        }

        for raw in &self.raw_outputs {
            let value = remapper
                .get(*raw)
                .ok_or(CompileError::UnresolvedValue {
                    segment: Some(self.index),
                    value: *raw,
                    role: ValueRole::RawOutput,
                })?;
            local.register_output(value)?;
        }

        self.check_local_arity(&local)?;
        Ok(local)
    }

    fn check_local_arity(&self, local: &Graph) -> CompileResult<()> {
        if local.inputs().len() != self.raw_inputs.len()
            || local.outputs().len() != self.raw_outputs.len()
        {
            return Err(CompileError::SegmentArity {
                segment: self.index,
                local_inputs: local.inputs().len(),
                raw_inputs: self.raw_inputs.len(),
                local_outputs: local.outputs().len(),
                raw_outputs: self.raw_outputs.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn remap_error(&self, err: RemapError, role: ValueRole) -> CompileError {
        match err {
            RemapError::Unresolved { value } => CompileError::UnresolvedValue {
                segment: Some(self.index),
                value,
                role,
            },
            RemapError::AlreadyMapped { value, .. } => CompileError::DuplicateMapping {
                segment: self.index,
                value,
            },
            RemapError::Graph(err) => CompileError::Graph(err),
        }
    }
}
