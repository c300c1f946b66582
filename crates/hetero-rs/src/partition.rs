//! Partitioner contract and coverage checks.
//!
//! Deciding which operators run on a native engine is the caller's business; this module only
//! defines how a decision is turned into segments and verifies that a partition is usable.

use crate::compile::error::{CompileError, CompileResult};
use crate::compile::segment::{Segment, SegmentTarget};
use crate::graph::{Graph, Node, NodeId, Operation, Producer};

/// Splits a graph into ordered segments.
pub trait Partitioner {
    fn partition(&self, graph: &Graph) -> CompileResult<Vec<Segment>>;
}

impl<F> Partitioner for F
where
    F: Fn(&Graph) -> CompileResult<Vec<Segment>>,
{
    fn partition(&self, graph: &Graph) -> CompileResult<Vec<Segment>> {
        self(graph)
    }
}

/// Groups maximal runs of nodes that share a placement into segments.
///
/// Constant nodes take the placement of the next non-constant node so that literals are
/// duplicated at their use sites instead of crossing a boundary. Structural operators left by
/// an earlier rewrite always stay on the host.
pub struct ContiguousPartitioner<F> {
    placement: F,
}

impl<F> ContiguousPartitioner<F>
where
    F: Fn(&Graph, &Node) -> SegmentTarget,
{
    pub fn new(placement: F) -> Self {
        Self { placement }
    }

    fn targets(&self, graph: &Graph) -> Vec<SegmentTarget> {
        let mut targets = vec![SegmentTarget::HostFallback; graph.node_count()];
        let mut next = None;
        for (position, node) in graph.nodes().iter().enumerate().rev() {
            let target = if node.op.is_constant() {
                next.unwrap_or(SegmentTarget::HostFallback)
            } else if node.op.is_structural() {
                SegmentTarget::HostFallback
            } else {
                (self.placement)(graph, node)
            };
            targets[position] = target;
            next = Some(target);
        }
        targets
    }
}

impl<F> Partitioner for ContiguousPartitioner<F>
where
    F: Fn(&Graph, &Node) -> SegmentTarget,
{
    fn partition(&self, graph: &Graph) -> CompileResult<Vec<Segment>> {
        graph.validate()?;
        let targets = self.targets(graph);
        let users = graph.users();

        let mut segments = Vec::new();
        let mut run: Vec<NodeId> = Vec::new();
        let mut current = None;
        for (node, target) in graph.nodes().iter().zip(targets) {
            if let Some(previous) = current.filter(|previous| *previous != target) {
                let nodes = std::mem::take(&mut run);
                segments.push(Segment::from_nodes_with_users(
                    graph,
                    &users,
                    segments.len(),
                    previous,
                    nodes,
                )?);
            }
            current = Some(target);
            run.push(node.id);
        }
        if let Some(target) = current {
            segments.push(Segment::from_nodes_with_users(
                graph,
                &users,
                segments.len(),
                target,
                run,
            )?);
        }
        Ok(segments)
    }
}

/// Checks that `segments` cover every node of `graph` exactly once, in program order, with
/// boundary lists that refer to real values.
pub fn validate_partition(graph: &Graph, segments: &[Segment]) -> CompileResult<()> {
    let mut expected = 0u32;
    for (position, segment) in segments.iter().enumerate() {
        let contract = |detail: String| CompileError::PartitionContract {
            segment: segment.index(),
            detail,
        };

        if segment.index() != position {
            return Err(contract(format!(
                "segment index {} does not match its position {position}",
                segment.index()
            )));
        }
        if segment.nodes().is_empty() {
            return Err(contract("segment has no nodes".to_string()));
        }
        for node in segment.nodes() {
            if node.0 != expected {
                let detail = if node.0 < expected {
                    format!("node {node} is covered twice or out of order")
                } else {
                    format!("node {} is not covered", NodeId(expected))
                };
                return Err(contract(detail));
            }
            graph.node(*node).map_err(|err| contract(err.to_string()))?;
            expected += 1;
        }

        let first = segment.nodes()[0];
        for raw in segment.raw_inputs() {
            match graph.producer(*raw).map_err(|err| contract(err.to_string()))? {
                Producer::Node { node, .. } if node >= first => {
                    return Err(contract(format!(
                        "raw input {raw} is produced inside or after the segment"
                    )));
                }
                _ => {}
            }
        }
        for raw in segment.raw_outputs() {
            let producer = graph.producer(*raw).map_err(|err| contract(err.to_string()))?;
            let produced_inside = match producer {
                Producer::Node { node, .. } => segment.nodes().contains(&node),
                Producer::Input { .. } => false,
            };
            if !produced_inside {
                return Err(contract(format!(
                    "raw output {raw} is not produced by the segment"
                )));
            }
        }
        if segment.target() == SegmentTarget::NativeEngine {
            for raw in segment.raw_outputs() {
                if matches!(graph.constant_literal(*raw), Ok(Some(_))) {
                    return Err(contract(format!(
                        "raw output {raw} is a constant literal"
                    )));
                }
            }
        }
    }

    if expected as usize != graph.node_count() {
        return Err(CompileError::PartitionContract {
            segment: segments.len(),
            detail: format!("node {} is not covered", NodeId(expected)),
        });
    }
    Ok(())
}

/// Places every node in a single fallback segment.
pub fn single_fallback(graph: &Graph) -> CompileResult<Vec<Segment>> {
    if graph.node_count() == 0 {
        return Ok(Vec::new());
    }
    let nodes = graph.nodes().iter().map(|node| node.id).collect();
    Ok(vec![Segment::from_nodes(
        graph,
        0,
        SegmentTarget::HostFallback,
        nodes,
    )?])
}

/// Placement helper: everything except custom host operators goes to the engine.
pub fn native_unless_custom(_graph: &Graph, node: &Node) -> SegmentTarget {
    match node.op {
        Operation::Custom(_) => SegmentTarget::HostFallback,
        _ => SegmentTarget::NativeEngine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::utils::f32_tensor;
    use crate::graph::{BinaryOp, UnaryOp, ValueId};

    fn chain() -> Graph {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_tensor(&[2]));
        let a = graph
            .append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_tensor(&[2]))
            .unwrap();
        let b = graph
            .append_single(Operation::Unary(UnaryOp::Neg), vec![a], f32_tensor(&[2]))
            .unwrap();
        graph.register_output(b).unwrap();
        graph
    }

    #[test]
    fn contiguous_runs_are_grouped() {
        let graph = chain();
        let partitioner = ContiguousPartitioner::new(|_: &Graph, node: &Node| match node.op {
            Operation::Unary(UnaryOp::Relu) => SegmentTarget::NativeEngine,
            _ => SegmentTarget::HostFallback,
        });
        let segments = partitioner.partition(&graph).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].raw_inputs(), &[ValueId(0)]);
        assert_eq!(segments[0].raw_outputs(), &[ValueId(1)]);
        assert_eq!(segments[1].raw_inputs(), &[ValueId(1)]);
        assert_eq!(segments[1].raw_outputs(), &[ValueId(2)]);
        validate_partition(&graph, &segments).unwrap();
    }

    #[test]
    fn missing_node_is_a_contract_violation() {
        let graph = chain();
        let segments = vec![Segment::from_nodes(
            &graph,
            0,
            SegmentTarget::HostFallback,
            vec![NodeId(0)],
        )
        .unwrap()];
        let err = validate_partition(&graph, &segments).unwrap_err();
        assert!(matches!(err, CompileError::PartitionContract { .. }), "{err}");
    }

    #[test]
    fn constants_follow_their_consumer() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_tensor(&[2]));
        let c = graph
            .append_single(
                Operation::Constant(crate::graph::utils::tensor_literal_f32(&[2], &[1.0, 2.0])),
                Vec::new(),
                f32_tensor(&[2]),
            )
            .unwrap();
        let y = graph
            .append_single(Operation::Binary(BinaryOp::Add), vec![x, c], f32_tensor(&[2]))
            .unwrap();
        graph.register_output(y).unwrap();

        let partitioner =
            ContiguousPartitioner::new(|_: &Graph, _: &Node| SegmentTarget::NativeEngine);
        let segments = partitioner.partition(&graph).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].target(), SegmentTarget::NativeEngine);
        assert_eq!(segments[0].raw_inputs(), &[x]);
    }

    #[test]
    fn structural_nodes_stay_on_the_host() {
        let mut graph = Graph::new();
        let x = graph.add_input(f32_tensor(&[2]));
        graph.create_list(vec![x]).unwrap();
        let y = graph
            .append_single(Operation::Unary(UnaryOp::Relu), vec![x], f32_tensor(&[2]))
            .unwrap();
        graph.register_output(y).unwrap();

        let segments = ContiguousPartitioner::new(|_: &Graph, _: &Node| SegmentTarget::NativeEngine)
            .partition(&graph)
            .unwrap();
        let targets: Vec<_> = segments.iter().map(Segment::target).collect();
        assert_eq!(
            targets,
            vec![SegmentTarget::HostFallback, SegmentTarget::NativeEngine]
        );
        validate_partition(&graph, &segments).unwrap();
    }
}
