//! Small-strain, history-dependent materials.
//!
//! A [`StrainLaw`] maps a strain increment, the strain and stress of the last
//! commit and its own state blocks to updated stress and state. The
//! [`StrainMaterial`] wrapper turns that into a [`ConstitutiveModel`] over
//! the deformation gradient: it derives `ε = sym(F - 1)`, keeps the previous
//! strain and stress in the two reserved trailing state blocks and
//! minor-symmetrizes the tangent.

use super::state::{StateComponent, StateLayout};
use super::{ConstitutiveModel, Formulation};
use crate::error::{Result, SolverError};
use crate::math::{
    BatchStrategy, DyadicMode, TensorField, cdya, dya, identity, identity_like, minor_symmetrize,
    sym, trace,
};

/// Inputs of one strain-law evaluation.
#[derive(Debug, Clone, Copy)]
pub struct StrainInput<'a> {
    /// Strain increment since the last commit
    pub dstrain: &'a TensorField,
    pub strain_old: &'a TensorField,
    pub stress_old: &'a TensorField,
    /// The law's own state blocks, in the order of
    /// [`StrainLaw::state_components`]
    pub state_old: &'a [TensorField],
}

/// Result of one strain-law evaluation.
#[derive(Debug, Clone)]
pub struct StrainOutput {
    pub stress: TensorField,
    /// Algorithmic tangent `∂σ/∂ε`, present when requested
    pub tangent: Option<TensorField>,
    /// Updated state blocks
    pub state: Vec<TensorField>,
}

/// Incremental small-strain law.
pub trait StrainLaw: Send + Sync {
    /// State blocks the law needs besides the reserved strain/stress pair.
    fn state_components(&self, _dim: usize) -> Vec<StateComponent> {
        Vec::new()
    }

    fn evaluate(
        &self,
        input: &StrainInput<'_>,
        tangent: bool,
        strategy: BatchStrategy,
    ) -> Result<StrainOutput>;
}

/// Lamé parameters `(λ, μ)` from Young's modulus and Poisson's ratio.
pub fn lame_converter(youngs_modulus: f64, poissons_ratio: f64) -> (f64, f64) {
    let (e, nu) = (youngs_modulus, poissons_ratio);
    let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
    let mu = e / (2.0 * (1.0 + nu));
    (lambda, mu)
}

/// Isotropic elasticity `λ 1⊗1 + 2μ 1⊙1` over the batch of `like`.
fn isotropic_elasticity(
    like: &TensorField,
    lambda: f64,
    mu: f64,
    strategy: BatchStrategy,
) -> Result<TensorField> {
    let eye = identity_like(like)?;
    dya(&eye, &eye, DyadicMode::Matrix, strategy)?
        .scale(lambda)
        .axpy(2.0 * mu, &cdya(&eye, &eye, strategy)?)
}

/// Elastic stress increment `2μ dε + λ tr(dε) 1`.
fn elastic_increment(dstrain: &TensorField, lambda: f64, mu: f64) -> Result<TensorField> {
    let eye = identity_like(dstrain)?;
    dstrain
        .scale(2.0 * mu)
        .add(&eye.scale_by(&trace(dstrain)?.scale(lambda))?)
}

/// Linear-elastic law in incremental form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearElastic {
    /// First Lamé parameter λ
    pub lambda: f64,
    /// Shear modulus μ
    pub mu: f64,
}

impl LinearElastic {
    pub fn new(lambda: f64, mu: f64) -> Self {
        Self { lambda, mu }
    }

    pub fn from_youngs_modulus(youngs_modulus: f64, poissons_ratio: f64) -> Self {
        let (lambda, mu) = lame_converter(youngs_modulus, poissons_ratio);
        Self { lambda, mu }
    }
}

impl StrainLaw for LinearElastic {
    fn evaluate(
        &self,
        input: &StrainInput<'_>,
        tangent: bool,
        strategy: BatchStrategy,
    ) -> Result<StrainOutput> {
        let stress = input
            .stress_old
            .add(&elastic_increment(input.dstrain, self.lambda, self.mu)?)?;
        let tangent = if tangent {
            Some(isotropic_elasticity(input.dstrain, self.lambda, self.mu, strategy)?)
        } else {
            None
        };
        Ok(StrainOutput {
            stress,
            tangent,
            state: Vec::new(),
        })
    }
}

/// Linear-elastic plasticity with linear isotropic hardening and a radial
/// return mapping. State blocks: equivalent plastic strain `alpha` (scalar)
/// and `plastic_strain` (`[dim, dim]`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearElasticPlasticIsotropicHardening {
    pub lambda: f64,
    pub mu: f64,
    /// Initial yield stress σy
    pub yield_stress: f64,
    /// Linear isotropic hardening modulus K
    pub hardening: f64,
}

impl LinearElasticPlasticIsotropicHardening {
    pub fn new(lambda: f64, mu: f64, yield_stress: f64, hardening: f64) -> Self {
        Self {
            lambda,
            mu,
            yield_stress,
            hardening,
        }
    }
}

/// Per-point result of the return mapping.
struct ReturnMapping {
    stress: Vec<f64>,
    tangent: Option<Vec<f64>>,
    alpha: f64,
    plastic_strain: Vec<f64>,
}

impl LinearElasticPlasticIsotropicHardening {
    #[allow(clippy::too_many_arguments)]
    fn return_mapping(
        &self,
        dim: usize,
        trial: &[f64],
        alpha: f64,
        plastic_strain: &[f64],
        elasticity: &[f64],
        identity_sym: &[f64],
        tangent: bool,
    ) -> ReturnMapping {
        let (mu, k) = (self.mu, self.hardening);
        let d2 = dim * dim;
        let mean = (0..dim).map(|i| trial[i * dim + i]).sum::<f64>() / dim as f64;
        let mut s = trial.to_vec();
        for i in 0..dim {
            s[i * dim + i] -= mean;
        }
        let norm_s = s.iter().map(|v| v * v).sum::<f64>().sqrt();
        let criterion = norm_s - (2.0_f64 / 3.0).sqrt() * (self.yield_stress + k * alpha);

        if criterion <= 0.0 {
            return ReturnMapping {
                stress: trial.to_vec(),
                tangent: tangent.then(|| elasticity.to_vec()),
                alpha,
                plastic_strain: plastic_strain.to_vec(),
            };
        }

        let denom = 2.0 * mu + 2.0 / 3.0 * k;
        let dgamma = criterion / denom;
        let n: Vec<f64> = s.iter().map(|v| v / norm_s).collect();
        let stress = trial
            .iter()
            .zip(&n)
            .map(|(t, ni)| t - 2.0 * mu * dgamma * ni)
            .collect();
        let plastic_strain = plastic_strain
            .iter()
            .zip(&n)
            .map(|(e, ni)| e + dgamma * ni)
            .collect();

        let tangent = tangent.then(|| {
            let c1 = 4.0 * mu * mu / denom;
            let c2 = 4.0 * mu * mu * dgamma / norm_s;
            let mut out = elasticity.to_vec();
            for ij in 0..d2 {
                for kl in 0..d2 {
                    let nn = n[ij] * n[kl];
                    let eye_eye = if ij % (dim + 1) == 0 && kl % (dim + 1) == 0 {
                        1.0
                    } else {
                        0.0
                    };
                    let dev_proj = identity_sym[ij * d2 + kl] - eye_eye / dim as f64 - nn;
                    out[ij * d2 + kl] -= c1 * nn + c2 * dev_proj;
                }
            }
            out
        });

        ReturnMapping {
            stress,
            tangent,
            alpha: alpha + (2.0_f64 / 3.0).sqrt() * dgamma,
            plastic_strain,
        }
    }
}

impl StrainLaw for LinearElasticPlasticIsotropicHardening {
    fn state_components(&self, dim: usize) -> Vec<StateComponent> {
        vec![
            StateComponent::new("alpha", &[]),
            StateComponent::new("plastic_strain", &[dim, dim]),
        ]
    }

    fn evaluate(
        &self,
        input: &StrainInput<'_>,
        tangent: bool,
        strategy: BatchStrategy,
    ) -> Result<StrainOutput> {
        let [alpha_old, plastic_old] = input.state_old else {
            return Err(SolverError::state_layout(format!(
                "plasticity needs 2 state blocks, got {}",
                input.state_old.len()
            )));
        };
        let dim = input.dstrain.shape()[0];
        let d2 = dim * dim;
        let (ne, np) = (input.dstrain.n_elements(), input.dstrain.n_points());

        let trial = input
            .stress_old
            .add(&elastic_increment(input.dstrain, self.lambda, self.mu)?)?;
        let eye = identity(dim, 1, 1);
        let elasticity = isotropic_elasticity(&eye, self.lambda, self.mu, strategy)?;
        let identity_sym = cdya(&eye, &eye, strategy)?;

        let points = strategy.map_indexed(trial.batch_len(), |b| {
            Ok(self.return_mapping(
                dim,
                trial.point(b),
                alpha_old.point(b)[0],
                plastic_old.point(b),
                elasticity.as_slice(),
                identity_sym.as_slice(),
                tangent,
            ))
        })?;

        let mut stress = Vec::with_capacity(d2 * points.len());
        let mut tangents = Vec::with_capacity(if tangent { d2 * d2 * points.len() } else { 0 });
        let mut alpha = Vec::with_capacity(points.len());
        let mut plastic = Vec::with_capacity(d2 * points.len());
        for p in points {
            stress.extend(p.stress);
            if let Some(t) = p.tangent {
                tangents.extend(t);
            }
            alpha.push(p.alpha);
            plastic.extend(p.plastic_strain);
        }

        Ok(StrainOutput {
            stress: TensorField::from_data(&[dim, dim], ne, np, stress)?,
            tangent: if tangent {
                Some(TensorField::from_data(&[dim, dim, dim, dim], ne, np, tangents)?)
            } else {
                None
            },
            state: vec![
                TensorField::from_data(&[], ne, np, alpha)?,
                TensorField::from_data(&[dim, dim], ne, np, plastic)?,
            ],
        })
    }
}

/// Single-field [`ConstitutiveModel`] over a [`StrainLaw`].
///
/// State layout: the law's blocks, then the strain and stress of the last
/// commit.
#[derive(Debug, Clone)]
pub struct StrainMaterial<L> {
    pub law: L,
    /// Spatial dimension of the deformation gradient
    pub dim: usize,
    pub strategy: BatchStrategy,
}

impl<L: StrainLaw> StrainMaterial<L> {
    pub fn new(law: L, dim: usize) -> Self {
        Self {
            law,
            dim,
            strategy: BatchStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Split the old state, derive the strain increment and run the law.
    fn run(
        &self,
        f: &TensorField,
        old_state: &TensorField,
        tangent: bool,
    ) -> Result<(StrainOutput, TensorField)> {
        if f.shape() != [self.dim, self.dim] {
            return Err(SolverError::shape(format!(
                "deformation gradient of shape {:?} for a {}D strain material",
                f.shape(),
                self.dim
            )));
        }
        let mut blocks = self.state_layout().split(old_state)?;
        let (stress_old, strain_old) = match (blocks.pop(), blocks.pop()) {
            (Some(stress), Some(strain)) => (stress, strain),
            _ => return Err(SolverError::state_layout("missing strain/stress blocks")),
        };
        let strain = sym(&f.sub(&identity_like(f)?)?)?;
        let dstrain = strain.sub(&strain_old)?;
        let input = StrainInput {
            dstrain: &dstrain,
            strain_old: &strain_old,
            stress_old: &stress_old,
            state_old: &blocks,
        };
        let output = self.law.evaluate(&input, tangent, self.strategy)?;
        Ok((output, strain_old.add(&dstrain)?))
    }
}

impl<L: StrainLaw> ConstitutiveModel for StrainMaterial<L> {
    fn formulation(&self) -> Formulation {
        Formulation::SingleField
    }

    fn state_layout(&self) -> StateLayout {
        StateLayout::with_strain_stress(self.law.state_components(self.dim), self.dim)
    }

    fn gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)> {
        let (output, strain) = self.run(&fields[0], old_state, false)?;
        let mut blocks = output.state;
        blocks.push(strain);
        blocks.push(output.stress.clone());
        let new_state = self.state_layout().pack(&blocks)?;
        Ok((vec![output.stress], new_state))
    }

    fn hessian(&self, fields: &[TensorField], old_state: &TensorField) -> Result<Vec<TensorField>> {
        let (output, _) = self.run(&fields[0], old_state, true)?;
        let tangent = output
            .tangent
            .ok_or_else(|| SolverError::shape("strain law returned no tangent"))?;
        Ok(vec![minor_symmetrize(&tangent)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitution::state::{OLD_STRAIN, OLD_STRESS};
    use approx::assert_abs_diff_eq;

    fn plastic() -> StrainMaterial<LinearElasticPlasticIsotropicHardening> {
        let (lambda, mu) = lame_converter(210000.0, 0.3);
        StrainMaterial::new(
            LinearElasticPlasticIsotropicHardening::new(lambda, mu, 355.0, 1000.0),
            3,
        )
    }

    fn uniaxial(strain: f64) -> TensorField {
        let mut f = identity(3, 1, 1);
        f.point_mut(0)[0] += strain;
        f
    }

    #[test]
    fn lame_parameters() {
        let (lambda, mu) = lame_converter(210000.0, 0.3);
        assert_abs_diff_eq!(mu, 80769.23076923077, epsilon = 1e-8);
        assert_abs_diff_eq!(lambda, 121153.84615384616, epsilon = 1e-8);
    }

    #[test]
    fn elastic_stress_is_linear() {
        let model = StrainMaterial::new(LinearElastic::new(2.0, 1.0), 3);
        let state = model.state_layout().zeros(1, 1);
        let (g, new_state) = model.evaluate_gradient(&[uniaxial(0.01)], &state).unwrap();
        // σ11 = (λ + 2μ) ε, σ22 = λ ε
        assert_abs_diff_eq!(g[0].get(&[0, 0], 0, 0), 0.04, epsilon = 1e-14);
        assert_abs_diff_eq!(g[0].get(&[1, 1], 0, 0), 0.02, epsilon = 1e-14);
        let strain = model.state_layout().range(OLD_STRAIN).unwrap();
        assert_abs_diff_eq!(new_state.point(0)[strain.start], 0.01, epsilon = 1e-14);
    }

    #[test]
    fn yielding_moves_stress_onto_the_hardened_surface() {
        let model = plastic();
        let state = model.state_layout().zeros(1, 1);
        let (g, new_state) = model.evaluate_gradient(&[uniaxial(0.01)], &state).unwrap();
        let alpha = new_state.point(0)[0];
        assert!(alpha > 0.0, "expected plastic flow, alpha = {alpha}");

        let s = crate::math::dev(&g[0]).unwrap();
        let norm_s = s.as_slice().iter().map(|v| v * v).sum::<f64>().sqrt();
        let radius = (2.0_f64 / 3.0).sqrt() * (355.0 + 1000.0 * alpha);
        assert_abs_diff_eq!(norm_s, radius, epsilon = 1e-8);
    }

    #[test]
    fn zero_increment_keeps_stress_and_history() {
        let model = plastic();
        let layout = model.state_layout();
        let state = model.state_layout().zeros(1, 1);
        let f = uniaxial(0.01);
        let (_, loaded) = model.evaluate_gradient(&[f.clone()], &state).unwrap();

        let (g, again) = model.evaluate_gradient(&[f], &loaded).unwrap();
        let stress = layout.range(OLD_STRESS).unwrap();
        for (a, b) in g[0].as_slice().iter().zip(&loaded.point(0)[stress]) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        for (a, b) in again.as_slice().iter().zip(loaded.as_slice()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn plane_plastic_tangent_matches_finite_difference() {
        let (lambda, mu) = lame_converter(210000.0, 0.3);
        let model = StrainMaterial::new(
            LinearElasticPlasticIsotropicHardening::new(lambda, mu, 355.0, 1000.0),
            2,
        );
        let state = model.state_layout().zeros(1, 1);
        let f = TensorField::from_data(&[2, 2], 1, 1, vec![1.01, 0.002, 0.002, 0.997]).unwrap();
        let h = model.evaluate_hessian(&[f.clone()], &state).unwrap();
        let stress = |f: &TensorField| {
            let (mut g, new_state) = model.evaluate_gradient(&[f.clone()], &state).unwrap();
            assert!(new_state.point(0)[0] > 0.0, "point must yield");
            g.swap_remove(0)
        };

        // symmetric direction, so the strain increment equals the perturbation
        let direction = [0.3, 0.5, 0.5, -0.2];
        let eps = 1e-8;
        let shifted = |sign: f64| {
            let mut g = f.clone();
            for (x, d) in g.point_mut(0).iter_mut().zip(direction) {
                *x += sign * eps * d;
            }
            stress(&g)
        };
        let (plus, minus) = (shifted(1.0), shifted(-1.0));
        let a = h[0].point(0);
        for ij in 0..4 {
            let linear: f64 = (0..4).map(|kl| a[ij * 4 + kl] * direction[kl]).sum();
            let fd = (plus.point(0)[ij] - minus.point(0)[ij]) / (2.0 * eps);
            assert_abs_diff_eq!(linear, fd, epsilon = 1e-5 * mu);
        }
    }

    #[test]
    fn tangent_is_minor_symmetric() {
        let model = plastic();
        let state = model.state_layout().zeros(1, 1);
        let mut f = uniaxial(0.01);
        f.point_mut(0)[1] += 0.004;
        let h = model.evaluate_hessian(&[f], &state).unwrap();
        let a = &h[0];
        for (i, j, k, l) in [(0, 1, 0, 0), (1, 2, 0, 1), (0, 2, 2, 1)] {
            let v = a.get(&[i, j, k, l], 0, 0);
            assert_abs_diff_eq!(v, a.get(&[j, i, k, l], 0, 0), epsilon = 1e-6);
            assert_abs_diff_eq!(v, a.get(&[i, j, l, k], 0, 0), epsilon = 1e-6);
        }
    }

    #[test]
    fn hessian_leaves_the_old_state_alone() {
        let model = plastic();
        let state = model.state_layout().zeros(1, 1);
        let before = state.clone();
        model.evaluate_hessian(&[uniaxial(0.02)], &state).unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn truncated_state_is_rejected() {
        let model = plastic();
        let state = TensorField::zeros(&[5], 1, 1);
        let err = model.evaluate_gradient(&[uniaxial(0.0)], &state).unwrap_err();
        assert!(matches!(err, SolverError::StateLayout(_)));
    }
}
