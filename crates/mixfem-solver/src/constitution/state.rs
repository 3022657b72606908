//! Per-point state variables with a fixed, declared layout.
//!
//! A [`StateLayout`] turns an ordered list of named component shapes into an
//! offset table over a flat buffer. A [`StateStore`] owns two snapshots of
//! that buffer for every (element, point): the committed `old` state that
//! tangent evaluations read, and the `trial` state written by the latest
//! gradient evaluation.

use crate::error::{Result, SolverError};
use crate::math::TensorField;
use std::ops::Range;

/// Name of the reserved component holding the strain of the last commit.
pub const OLD_STRAIN: &str = "strain";
/// Name of the reserved component holding the stress of the last commit.
pub const OLD_STRESS: &str = "stress";

/// A named block of the state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateComponent {
    pub name: String,
    /// Tensor shape of the block; `[]` for a scalar
    pub shape: Vec<usize>,
}

impl StateComponent {
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Deterministic offset table over a flat state vector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateLayout {
    components: Vec<StateComponent>,
    offsets: Vec<usize>,
    len: usize,
}

impl StateLayout {
    /// Build a layout; blocks are stored in the given order.
    pub fn new(components: Vec<StateComponent>) -> Self {
        let mut offsets = Vec::with_capacity(components.len());
        let mut len = 0;
        for c in &components {
            offsets.push(len);
            len += c.size();
        }
        Self {
            components,
            offsets,
            len,
        }
    }

    /// Layout without any state.
    pub fn empty() -> Self {
        Self::default()
    }

    /// User blocks followed by the two reserved trailing blocks
    /// ([`OLD_STRAIN`], [`OLD_STRESS`]) of shape `[dim, dim]`.
    pub fn with_strain_stress(mut components: Vec<StateComponent>, dim: usize) -> Self {
        components.push(StateComponent::new(OLD_STRAIN, &[dim, dim]));
        components.push(StateComponent::new(OLD_STRESS, &[dim, dim]));
        Self::new(components)
    }

    /// Total number of values per point.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn components(&self) -> &[StateComponent] {
        &self.components
    }

    /// Position of a named block inside the flat vector.
    pub fn range(&self, name: &str) -> Option<Range<usize>> {
        self.components
            .iter()
            .zip(&self.offsets)
            .find(|(c, _)| c.name == name)
            .map(|(c, &o)| o..o + c.size())
    }

    /// A zero-initialized state field for the given batch.
    pub fn zeros(&self, n_elements: usize, n_points: usize) -> TensorField {
        TensorField::zeros(&[self.len], n_elements, n_points)
    }

    /// Fail unless `state` is a `[len]` field.
    pub fn check(&self, state: &TensorField) -> Result<()> {
        if state.shape() != [self.len] {
            return Err(SolverError::state_layout(format!(
                "state of shape {:?} does not match layout length {}",
                state.shape(),
                self.len
            )));
        }
        Ok(())
    }

    /// Read every block of a state field into its own field.
    pub fn split(&self, state: &TensorField) -> Result<Vec<TensorField>> {
        self.check(state)?;
        let (ne, np) = (state.n_elements(), state.n_points());
        self.components
            .iter()
            .zip(&self.offsets)
            .map(|(c, &o)| {
                let size = c.size();
                let mut data = Vec::with_capacity(size * state.batch_len());
                for b in 0..state.batch_len() {
                    data.extend_from_slice(&state.point(b)[o..o + size]);
                }
                TensorField::from_data(&c.shape, ne, np, data)
            })
            .collect()
    }

    /// Concatenate one field per block back into a flat state field.
    pub fn pack(&self, blocks: &[TensorField]) -> Result<TensorField> {
        if blocks.len() != self.components.len() {
            return Err(SolverError::state_layout(format!(
                "{} blocks given for a layout of {} components",
                blocks.len(),
                self.components.len()
            )));
        }
        for (block, c) in blocks.iter().zip(&self.components) {
            if block.size() != c.size() {
                return Err(SolverError::state_layout(format!(
                    "block '{}' has {} values per point, expected {}",
                    c.name,
                    block.size(),
                    c.size()
                )));
            }
        }
        let Some(first) = blocks.first() else {
            return Err(SolverError::state_layout(
                "cannot pack an empty layout without a batch",
            ));
        };
        let (ne, np) = (first.n_elements(), first.n_points());
        let mut data = Vec::with_capacity(self.len * ne * np);
        for b in 0..ne * np {
            for block in blocks {
                if !block.same_batch(first) {
                    return Err(SolverError::state_layout("blocks with mixed batches"));
                }
                data.extend_from_slice(block.point(b));
            }
        }
        TensorField::from_data(&[self.len], ne, np, data)
    }
}

/// Double-buffered state of one constitutive model over a batch.
#[derive(Debug, Clone)]
pub struct StateStore {
    layout: StateLayout,
    old: TensorField,
    trial: TensorField,
}

impl StateStore {
    /// Zero-initialized store.
    pub fn new(layout: StateLayout, n_elements: usize, n_points: usize) -> Self {
        let old = layout.zeros(n_elements, n_points);
        Self {
            trial: old.clone(),
            old,
            layout,
        }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// State of the last commit.
    pub fn old(&self) -> &TensorField {
        &self.old
    }

    /// State written by the latest gradient evaluation.
    pub fn trial(&self) -> &TensorField {
        &self.trial
    }

    /// Replace the trial state; the length and batch may never change.
    pub fn assign(&mut self, state: TensorField) -> Result<()> {
        self.layout.check(&state)?;
        if !state.same_batch(&self.old) {
            return Err(SolverError::state_layout(format!(
                "state batch ({}, {}) does not match store batch ({}, {})",
                state.n_elements(),
                state.n_points(),
                self.old.n_elements(),
                self.old.n_points()
            )));
        }
        self.trial = state;
        Ok(())
    }

    /// Freeze the trial state as the new old state.
    pub fn commit(&mut self) {
        self.old = self.trial.clone();
    }

    /// Drop the trial state and return to the last commit.
    pub fn rollback(&mut self) {
        self.trial = self.old.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plastic_layout() -> StateLayout {
        StateLayout::with_strain_stress(
            vec![
                StateComponent::new("alpha", &[]),
                StateComponent::new("plastic_strain", &[3, 3]),
            ],
            3,
        )
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let layout = plastic_layout();
        assert_eq!(layout.len(), 1 + 9 + 9 + 9);
        assert_eq!(layout.range("alpha"), Some(0..1));
        assert_eq!(layout.range("plastic_strain"), Some(1..10));
        assert_eq!(layout.range(OLD_STRAIN), Some(10..19));
        assert_eq!(layout.range(OLD_STRESS), Some(19..28));
        assert_eq!(layout.range("missing"), None);
    }

    #[test]
    fn split_then_pack_restores_the_buffer() {
        let layout = plastic_layout();
        let data: Vec<f64> = (0..28 * 2 * 3).map(|v| v as f64).collect();
        let state = TensorField::from_data(&[28], 2, 3, data).unwrap();
        let blocks = layout.split(&state).unwrap();
        assert_eq!(blocks[1].shape(), &[3, 3]);
        assert_eq!(blocks[0].scalar(1, 0), 84.0);
        assert_eq!(layout.pack(&blocks).unwrap(), state);
    }

    #[test]
    fn store_rejects_length_changes() {
        let mut store = StateStore::new(plastic_layout(), 2, 1);
        let err = store.assign(TensorField::zeros(&[27], 2, 1)).unwrap_err();
        assert!(matches!(err, SolverError::StateLayout(_)));
        assert_eq!(store.trial().shape(), &[28]);
    }

    #[test]
    fn commit_and_rollback() {
        let mut store = StateStore::new(plastic_layout(), 1, 1);
        store.assign(TensorField::filled(&[28], 1, 1, 2.0)).unwrap();
        assert_eq!(store.old().as_slice()[0], 0.0);
        store.commit();
        assert_eq!(store.old().as_slice()[0], 2.0);
        store.assign(TensorField::filled(&[28], 1, 1, 5.0)).unwrap();
        store.rollback();
        assert_eq!(store.trial().as_slice()[0], 2.0);
    }
}
