//! Constitutive models.
//!
//! Every material is a [`ConstitutiveModel`]: it maps a list of input fields
//! (the deformation gradient, plus pressure and volume ratio for the
//! three-field formulation) and the previous state to stress-like gradients
//! and a new state, or to the matching elasticity (hessian) blocks.
//!
//! Three families implement it:
//! - [`HyperelasticMaterial`] / [`ThreeFieldVariation`] over a [`Hyperelastic`] law
//! - [`StrainMaterial`] over an incremental [`StrainLaw`]
//! - [`UserMaterial`] built from injected closures

pub mod hyperelastic;
pub mod state;
pub mod strain;
pub mod user;

pub use hyperelastic::{Hyperelastic, HyperelasticMaterial, NeoHooke, ThreeFieldVariation};
pub use state::{OLD_STRAIN, OLD_STRESS, StateComponent, StateLayout, StateStore};
pub use strain::{
    LinearElastic, LinearElasticPlasticIsotropicHardening, StrainInput, StrainLaw,
    StrainMaterial, StrainOutput, lame_converter,
};
pub use user::UserMaterial;

use crate::error::{Result, SolverError};
use crate::math::TensorField;

/// Which field triple a model is formulated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Formulation {
    /// Displacement only: inputs `[F]`, one hessian block.
    #[default]
    SingleField,
    /// Displacement, pressure and volume ratio: inputs `[F, p, J]`, hessian
    /// blocks in the order (FF, Fp, FJ, pp, pJ, JJ).
    ThreeField,
}

impl Formulation {
    /// Number of input (and gradient) fields.
    pub fn arity(self) -> usize {
        match self {
            Formulation::SingleField => 1,
            Formulation::ThreeField => 3,
        }
    }

    /// Number of upper-triangle hessian blocks.
    pub fn hessian_blocks(self) -> usize {
        let n = self.arity();
        n * (n + 1) / 2
    }
}

/// Stress and elasticity evaluator with per-point state history.
///
/// Implementors provide [`gradient`](Self::gradient) and
/// [`hessian`](Self::hessian); callers go through
/// [`evaluate_gradient`](Self::evaluate_gradient) and
/// [`evaluate_hessian`](Self::evaluate_hessian), which check the field arity
/// and the state layout around them.
///
/// The hessian never sees anything but the old state, so it can be evaluated
/// before, after or concurrently with the gradient of the same iteration.
pub trait ConstitutiveModel: Send + Sync {
    fn formulation(&self) -> Formulation {
        Formulation::SingleField
    }

    /// Layout of the per-point state vector.
    fn state_layout(&self) -> StateLayout {
        StateLayout::empty()
    }

    /// Stress-like gradients (one per input field) and the new state.
    fn gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)>;

    /// Upper-triangle elasticity blocks.
    fn hessian(&self, fields: &[TensorField], old_state: &TensorField) -> Result<Vec<TensorField>>;

    /// Checked gradient evaluation.
    fn evaluate_gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)> {
        let layout = self.check_inputs(fields, old_state)?;
        let (gradients, new_state) = self.gradient(fields, old_state)?;
        layout.check(&new_state)?;
        if !new_state.same_batch(old_state) {
            return Err(SolverError::state_layout("new state changed the batch size"));
        }
        Ok((gradients, new_state))
    }

    /// Checked hessian evaluation.
    fn evaluate_hessian(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<Vec<TensorField>> {
        self.check_inputs(fields, old_state)?;
        let hessians = self.hessian(fields, old_state)?;
        let expected = self.formulation().hessian_blocks();
        if hessians.len() != expected {
            return Err(SolverError::shape(format!(
                "{} hessian blocks returned, expected {expected}",
                hessians.len()
            )));
        }
        Ok(hessians)
    }

    #[doc(hidden)]
    fn check_inputs(&self, fields: &[TensorField], old_state: &TensorField) -> Result<StateLayout> {
        let expected = self.formulation().arity();
        if fields.len() != expected {
            return Err(SolverError::FieldArity {
                expected,
                found: fields.len(),
            });
        }
        let layout = self.state_layout();
        layout.check(old_state)?;
        if !old_state.same_batch(&fields[0]) {
            return Err(SolverError::state_layout(format!(
                "state batch ({}, {}) does not match field batch ({}, {})",
                old_state.n_elements(),
                old_state.n_points(),
                fields[0].n_elements(),
                fields[0].n_points()
            )));
        }
        Ok(layout)
    }
}
