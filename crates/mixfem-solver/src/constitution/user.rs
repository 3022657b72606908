//! Materials assembled from injected stress and elasticity functions.

use super::state::StateLayout;
use super::{ConstitutiveModel, Formulation};
use crate::error::Result;
use crate::math::TensorField;

/// `(fields, old_state, config) -> (gradients, new_state)`
pub type GradientFn<C> =
    dyn Fn(&[TensorField], &TensorField, &C) -> Result<(Vec<TensorField>, TensorField)> + Send + Sync;

/// `(fields, old_state, config) -> hessian blocks`
pub type HessianFn<C> = dyn Fn(&[TensorField], &TensorField, &C) -> Result<Vec<TensorField>> + Send + Sync;

/// A [`ConstitutiveModel`] whose behaviour is supplied as two functions and a
/// typed configuration.
///
/// The hessian function only ever receives the old state by shared
/// reference; only the gradient function produces a new state.
pub struct UserMaterial<C> {
    config: C,
    formulation: Formulation,
    layout: StateLayout,
    gradient: Box<GradientFn<C>>,
    hessian: Box<HessianFn<C>>,
}

impl<C: Send + Sync> UserMaterial<C> {
    /// Single-field material without state.
    pub fn new<G, H>(config: C, gradient: G, hessian: H) -> Self
    where
        G: Fn(&[TensorField], &TensorField, &C) -> Result<(Vec<TensorField>, TensorField)>
            + Send
            + Sync
            + 'static,
        H: Fn(&[TensorField], &TensorField, &C) -> Result<Vec<TensorField>> + Send + Sync + 'static,
    {
        Self {
            config,
            formulation: Formulation::SingleField,
            layout: StateLayout::empty(),
            gradient: Box::new(gradient),
            hessian: Box::new(hessian),
        }
    }

    pub fn with_state(mut self, layout: StateLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_formulation(mut self, formulation: Formulation) -> Self {
        self.formulation = formulation;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }
}

impl<C> std::fmt::Debug for UserMaterial<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMaterial")
            .field("formulation", &self.formulation)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync> ConstitutiveModel for UserMaterial<C> {
    fn formulation(&self) -> Formulation {
        self.formulation
    }

    fn state_layout(&self) -> StateLayout {
        self.layout.clone()
    }

    fn gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)> {
        (self.gradient)(fields, old_state, &self.config)
    }

    fn hessian(&self, fields: &[TensorField], old_state: &TensorField) -> Result<Vec<TensorField>> {
        (self.hessian)(fields, old_state, &self.config)
    }
}
