use crate::compile::remap::{RemapError, ValueRemapper};
use crate::graph::{Graph, NodeId};

/// Clones `node` of `src` to the end of `dst`.
///
/// Operands are resolved through `remapper`; the clone keeps the operator and any literal
/// payload, and each original result is mapped to the corresponding cloned result.
pub fn clone_node(
    src: &Graph,
    node: NodeId,
    dst: &mut Graph,
    remapper: &mut ValueRemapper,
) -> Result<NodeId, RemapError> {
    let original = src.node(node)?;

    let mut inputs = Vec::with_capacity(original.inputs.len());
    for input in &original.inputs {
        inputs.push(remapper.resolve(src, *input, dst)?);
    }

    let mut output_types = Vec::with_capacity(original.outputs.len());
    for output in &original.outputs {
        output_types.push(src.value_type(*output)?.clone());
    }

    let cloned = dst.append_node(original.op.clone(), inputs, output_types)?;
    let cloned_outputs = dst.node(cloned)?.outputs.clone();
    for (old, new) in original.outputs.iter().zip(cloned_outputs) {
        dst.set_value_name(new, src.value(*old)?.name.clone())?;
        remapper.insert(*old, new)?;
    }
    Ok(cloned)
}
