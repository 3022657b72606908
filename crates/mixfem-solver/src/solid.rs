//! Solid body: current fields, constitutive model and state of one region.
//!
//! A [`SolidBody`] owns the nodal displacement, the per-element pressure and
//! volume ratio (three-field models only) and the double-buffered state of
//! its material. It implements [`NonlinearProblem`] so the Newton driver can
//! assemble, solve and update it.

use crate::assembly::{Assembly, Condensation, LocalIncrements, MixedFieldAssembler};
use crate::constitution::{ConstitutiveModel, Formulation, StateStore};
use crate::error::Result;
use crate::math::{BatchStrategy, TensorField};
use crate::nonlinear_solver::NonlinearProblem;
use crate::region::Region;
use log::debug;
use nalgebra::DVector;

pub struct SolidBody<'a> {
    region: &'a Region,
    model: &'a dyn ConstitutiveModel,
    strategy: BatchStrategy,
    displacement: Vec<f64>,
    pressure: Vec<f64>,
    volume_ratio: Vec<f64>,
    state: StateStore,
    condensation: Option<Condensation>,
}

impl<'a> SolidBody<'a> {
    /// Undeformed body: `u = 0`, `p = 0`, `J = 1` and zero state.
    pub fn new(region: &'a Region, model: &'a dyn ConstitutiveModel) -> Self {
        let (ne, nq) = (region.n_elements(), region.n_points());
        Self {
            region,
            model,
            strategy: BatchStrategy::default(),
            displacement: vec![0.0; region.mesh().num_dofs()],
            pressure: vec![0.0; ne],
            volume_ratio: vec![1.0; ne],
            state: StateStore::new(model.state_layout(), ne, nq),
            condensation: None,
        }
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn region(&self) -> &'a Region {
        self.region
    }

    pub fn formulation(&self) -> Formulation {
        self.model.formulation()
    }

    /// Per-element pressure (zero for single-field models).
    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    /// Per-element volume ratio (one for single-field models).
    pub fn volume_ratio(&self) -> &[f64] {
        &self.volume_ratio
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Deformation gradient of the current displacement.
    pub fn deformation_gradient(&self) -> Result<TensorField> {
        self.region
            .deformation_gradient(&self.displacement, self.strategy)
    }

    /// Input fields of the constitutive model for a deformation gradient.
    fn fields(&self, f: TensorField) -> Result<Vec<TensorField>> {
        match self.model.formulation() {
            Formulation::SingleField => Ok(vec![f]),
            Formulation::ThreeField => Ok(vec![
                f,
                self.region.interpolate_cells(&self.pressure)?,
                self.region.interpolate_cells(&self.volume_ratio)?,
            ]),
        }
    }

    /// First Piola-Kirchhoff stress of the current fields against the
    /// committed state. Leaves the trial state alone.
    pub fn stress(&self) -> Result<TensorField> {
        let fields = self.fields(self.deformation_gradient()?)?;
        let (mut gradients, _) = self.model.evaluate_gradient(&fields, self.state.old())?;
        Ok(gradients.swap_remove(0))
    }

    /// Re-evaluate the trial state at the current fields.
    pub fn refresh_state(&mut self) -> Result<()> {
        let fields = self.fields(self.deformation_gradient()?)?;
        let (_, new_state) = self.model.evaluate_gradient(&fields, self.state.old())?;
        self.state.assign(new_state)
    }

    /// Freeze the state of the last evaluation.
    pub fn commit(&mut self) {
        self.state.commit();
    }

    /// Discard the state of the last evaluation.
    pub fn rollback(&mut self) {
        self.state.rollback();
    }
}

impl NonlinearProblem for SolidBody<'_> {
    fn displacement(&self) -> &[f64] {
        &self.displacement
    }

    fn assemble(&mut self) -> Result<Assembly> {
        let fields = self.fields(self.deformation_gradient()?)?;
        let old = self.state.old();
        // the tangent only ever sees the committed state
        let hessians = self.model.evaluate_hessian(&fields, old)?;
        let (gradients, new_state) = self.model.evaluate_gradient(&fields, old)?;
        self.state.assign(new_state)?;

        let assembler = MixedFieldAssembler::new(self.region, self.strategy);
        match self.model.formulation() {
            Formulation::SingleField => {
                self.condensation = None;
                assembler.assemble(&gradients[0], &hessians[0])
            }
            Formulation::ThreeField => {
                let (system, condensation) = assembler.assemble_three_field(
                    &fields[0],
                    &self.volume_ratio,
                    &gradients,
                    &hessians,
                )?;
                self.condensation = Some(condensation);
                Ok(system)
            }
        }
    }

    fn recover(&self, du: &DVector<f64>) -> LocalIncrements {
        match &self.condensation {
            Some(condensation) => condensation.recover(self.region, du),
            None => LocalIncrements {
                dp: Vec::new(),
                dj: Vec::new(),
            },
        }
    }

    fn update(&mut self, du: &DVector<f64>, local: &LocalIncrements) {
        for (u, d) in self.displacement.iter_mut().zip(du.iter()) {
            *u += d;
        }
        for (j, d) in self.volume_ratio.iter_mut().zip(&local.dj) {
            *j += d;
        }
        for (p, d) in self.pressure.iter_mut().zip(&local.dp) {
            *p += d;
        }
        debug!("updated {} dofs, {} condensed elements", du.len(), local.dj.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitution::{
        HyperelasticMaterial, LinearElastic, NeoHooke, StrainMaterial, ThreeFieldVariation,
    };
    use crate::mesh::Mesh;
    use crate::quadrature::GaussLegendre;

    fn region() -> Region {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        Region::new(mesh, GaussLegendre::hexahedron(2).unwrap()).unwrap()
    }

    #[test]
    fn undeformed_body_has_zero_residual() {
        let region = region();
        let model = HyperelasticMaterial::new(NeoHooke::new(1.0, Some(10.0)));
        let mut body = SolidBody::new(&region, &model);
        let system = body.assemble().unwrap();
        assert!(system.residual.amax() < 1e-14);
        assert_eq!(system.tangent.nrows(), 24);
        assert!(body.recover(&DVector::zeros(24)).dj.is_empty());
    }

    #[test]
    fn three_field_update_moves_local_fields() {
        let region = region();
        let model = ThreeFieldVariation::new(NeoHooke::isochoric(1.0), 10.0);
        let mut body = SolidBody::new(&region, &model);
        body.assemble().unwrap();
        let mut du = DVector::zeros(24);
        for (p, x) in region.mesh().points.iter().enumerate() {
            du[p * 3 + 2] = -0.1 * x[2];
        }
        let local = body.recover(&du);
        body.update(&du, &local);
        assert!((body.volume_ratio()[0] - 0.9).abs() < 1e-12);
        assert!((body.pressure()[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn state_is_committed_only_on_request() {
        let region = region();
        let model = StrainMaterial::new(LinearElastic::new(1.0, 1.0), 3);
        let mut body = SolidBody::new(&region, &model);
        let mut du = DVector::zeros(24);
        for (p, x) in region.mesh().points.iter().enumerate() {
            du[p * 3] = 0.01 * x[0];
        }
        let local = body.recover(&du);
        body.update(&du, &local);
        body.assemble().unwrap();
        assert_eq!(body.state().old().as_slice().iter().map(|v| v.abs()).sum::<f64>(), 0.0);
        assert!(body.state().trial().as_slice().iter().any(|&v| v != 0.0));
        body.commit();
        assert_eq!(body.state().old(), body.state().trial());
    }
}
