use std::fmt;

use crate::graph::{Graph, NodeId, Producer, ValueId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// An operand is neither a graph input nor produced by an earlier node.
    MissingOperand { value: ValueId, node: NodeId },
    /// A graph input is missing from the value arena or not marked as an input.
    MissingInput { value: ValueId },
    /// A registered output does not exist.
    MissingOutput { value: ValueId },
    /// A node's result list disagrees with its operation or with the value arena.
    ResultMismatch { node: NodeId },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::MissingOperand { value, node } => {
                write!(f, "operand value {value} is missing before node {node}")
            }
            TopologyError::MissingInput { value } => {
                write!(f, "graph input {value} is not defined as an input")
            }
            TopologyError::MissingOutput { value } => {
                write!(f, "graph output {value} is never defined")
            }
            TopologyError::ResultMismatch { node } => {
                write!(f, "results of node {node} do not match its operation")
            }
        }
    }
}

impl std::error::Error for TopologyError {}

impl Graph {
    /// Re-checks that program order is a valid topological order.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut available = vec![false; self.value_count()];
        for (index, input) in self.inputs().iter().enumerate() {
            let expected = Producer::Input {
                index: index as u32,
            };
            match self.producer(*input) {
                Ok(producer) if producer == expected => available[input.0 as usize] = true,
                _ => return Err(TopologyError::MissingInput { value: *input }),
            }
        }

        for (position, node) in self.nodes().iter().enumerate() {
            if node.id.0 as usize != position
                || node.outputs.len() != node.op.expected_outputs()
            {
                return Err(TopologyError::ResultMismatch { node: node.id });
            }
            for input in &node.inputs {
                if !available.get(input.0 as usize).copied().unwrap_or(false) {
                    return Err(TopologyError::MissingOperand {
                        value: *input,
                        node: node.id,
                    });
                }
            }
            for (index, output) in node.outputs.iter().enumerate() {
                let expected = Producer::Node {
                    node: node.id,
                    index: index as u32,
                };
                match self.producer(*output) {
                    Ok(producer) if producer == expected => available[output.0 as usize] = true,
                    _ => return Err(TopologyError::ResultMismatch { node: node.id }),
                }
            }
        }

        for output in self.outputs() {
            if !available.get(output.0 as usize).copied().unwrap_or(false) {
                return Err(TopologyError::MissingOutput { value: *output });
            }
        }

        Ok(())
    }
}
