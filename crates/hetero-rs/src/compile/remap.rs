use thiserror::Error;

use crate::graph::{Graph, GraphError, Operation, ValueId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemapError {
    /// The value has no entry and the destination no longer accepts new inputs.
    #[error("value {value} has no counterpart in the destination graph")]
    Unresolved { value: ValueId },
    #[error("value {value} is already mapped to {existing}")]
    AlreadyMapped { value: ValueId, existing: ValueId },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Monotonic mapping from source-graph values to destination-graph values.
///
/// Entries live in an arena indexed by the source value id and are never overwritten.
/// Constant literals are deliberately not memoized by [`ValueRemapper::resolve`]: every use site
/// gets its own cloned constant node.
#[derive(Debug, Clone, Default)]
pub struct ValueRemapper {
    slots: Vec<Option<ValueId>>,
    sealed: bool,
    mapped: usize,
}

impl ValueRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the arena for every value of `source`.
    pub fn for_source(source: &Graph) -> Self {
        Self {
            slots: vec![None; source.value_count()],
            sealed: false,
            mapped: 0,
        }
    }

    /// Stops [`ValueRemapper::resolve`] from introducing new destination inputs.
    ///
    /// After sealing, resolving an unmapped non-constant value is an error instead of a new
    /// graph input.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn get(&self, original: ValueId) -> Option<ValueId> {
        self.slots.get(original.0 as usize).copied().flatten()
    }

    pub fn contains(&self, original: ValueId) -> bool {
        self.get(original).is_some()
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.mapped
    }

    pub fn is_empty(&self) -> bool {
        self.mapped == 0
    }

    /// Records `original -> rewritten`; an existing entry is never replaced.
    pub fn insert(&mut self, original: ValueId, rewritten: ValueId) -> Result<(), RemapError> {
        let index = original.0 as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        match self.slots[index] {
            Some(existing) => Err(RemapError::AlreadyMapped {
                value: original,
                existing,
            }),
            None => {
                self.slots[index] = Some(rewritten);
                self.mapped += 1;
                Ok(())
            }
        }
    }

    /// Returns the destination value standing in for `original`.
    ///
    /// Mapped values resolve to their entry. Constant literals are cloned into `dst` on every
    /// call. Any other value becomes a new input of `dst` carrying the source type and name,
    /// unless the remapper is sealed.
    pub fn resolve(
        &mut self,
        src: &Graph,
        original: ValueId,
        dst: &mut Graph,
    ) -> Result<ValueId, RemapError> {
        if let Some(existing) = self.get(original) {
            return Ok(existing);
        }

        let info = src.value(original)?;
        if let Some(node) = src.producing_node(original)? {
            if let Operation::Constant(literal) = &node.op {
                let cloned = dst.append_single(
                    Operation::Constant(literal.clone()),
                    Vec::new(),
                    info.ty.clone(),
                )?;
                dst.set_value_name(cloned, info.name.clone())?;
                return Ok(cloned);
            }
        }

        if self.sealed {
            return Err(RemapError::Unresolved { value: original });
        }

        let input = dst.add_input(info.ty.clone());
        dst.copy_metadata(input, info)?;
        self.insert(original, input)?;
        Ok(input)
    }

    /// Like [`ValueRemapper::resolve`] but never introduces a destination input.
    pub fn resolve_existing(
        &mut self,
        src: &Graph,
        original: ValueId,
        dst: &mut Graph,
    ) -> Result<ValueId, RemapError> {
        let sealed = self.sealed;
        self.sealed = true;
        let result = self.resolve(src, original, dst);
        self.sealed = sealed;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::utils::f32_tensor;

    #[test]
    fn insert_is_monotonic() {
        let mut remapper = ValueRemapper::new();
        remapper.insert(ValueId(3), ValueId(0)).unwrap();
        let err = remapper.insert(ValueId(3), ValueId(1)).unwrap_err();
        assert_eq!(
            err,
            RemapError::AlreadyMapped {
                value: ValueId(3),
                existing: ValueId(0)
            }
        );
        assert_eq!(remapper.get(ValueId(3)), Some(ValueId(0)));
        assert_eq!(remapper.len(), 1);
    }

    #[test]
    fn sealed_remapper_refuses_new_inputs() {
        let mut src = Graph::new();
        let x = src.add_input(f32_tensor(&[1]));
        let mut dst = Graph::new();
        let mut remapper = ValueRemapper::for_source(&src);
        remapper.seal();
        assert!(remapper.is_sealed());
        let err = remapper.resolve(&src, x, &mut dst).unwrap_err();
        assert_eq!(err, RemapError::Unresolved { value: x });
        assert!(dst.inputs().is_empty());
    }
}
